use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// 记录类别 (凭证 / 单据 / 债权人)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Voucher,
    Document,
    Creditor,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Voucher => write!(f, "voucher"),
            RecordKind::Document => write!(f, "document"),
            RecordKind::Creditor => write!(f, "creditor"),
        }
    }
}

/// 匹配引擎错误
#[derive(Debug, Error)]
pub enum MatchError {
    /// 记录缺少必需属性 - 生成阶段跳过并告警，不中断整轮
    #[error("invalid {kind} record {id}: {reason}")]
    InvalidRecord {
        kind: RecordKind,
        id: String,
        reason: String,
    },

    /// 违反账本约束 - 调用方需刷新状态后重试
    #[error("conflict: {0}")]
    Conflict(String),

    /// 引用了不存在或已决议的对象 - 通常意味着界面状态不同步
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// 录入了已存在的记录ID
    #[error("{kind} already exists: {id}")]
    DuplicateRecord { kind: RecordKind, id: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type MatchResult<T> = Result<T, MatchError>;

impl MatchError {
    pub fn proposal_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "proposal",
            id: id.to_string(),
        }
    }

    pub fn voucher_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "voucher",
            id: id.to_string(),
        }
    }

    pub fn document_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "document",
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            MatchError::Conflict(_) | MatchError::DuplicateRecord { .. } => StatusCode::CONFLICT,
            MatchError::InvalidRecord { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            MatchError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<config::ConfigError> for MatchError {
    fn from(value: config::ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for MatchError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
