use crate::error::MatchError;
use crate::models::{
    AuditEvent, Creditor, DocumentId, DocumentRecord, Proposal, ProposalId, VoucherId,
    VoucherRecord,
};
use crate::service::{
    DecisionOutcome, EngineStats, MatchEngine, MatchInfo, ProposalView,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 通用响应体
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Response {
        let body = ApiResponse {
            success: true,
            message: message.into(),
            data: Some(data),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

fn internal_error(message: String) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        message,
        data: None,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// 决议请求体
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub actor: String,
}

/// 人工提案请求体
#[derive(Debug, Deserialize)]
pub struct ManualProposalRequest {
    pub voucher_id: String,
    pub document_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub since: u64,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 录入凭证
pub async fn ingest_vouchers(
    State(engine): State<Arc<MatchEngine>>,
    Json(records): Json<Vec<VoucherRecord>>,
) -> Response {
    let summary = engine.ingest_vouchers(records);
    ApiResponse::ok(
        format!("Accepted {} vouchers", summary.accepted),
        summary,
    )
}

/// 录入单据
pub async fn ingest_documents(
    State(engine): State<Arc<MatchEngine>>,
    Json(records): Json<Vec<DocumentRecord>>,
) -> Response {
    let summary = engine.ingest_documents(records);
    ApiResponse::ok(
        format!("Accepted {} documents", summary.accepted),
        summary,
    )
}

/// 登记债权人别名
pub async fn register_creditors(
    State(engine): State<Arc<MatchEngine>>,
    Json(creditors): Json<Vec<Creditor>>,
) -> Response {
    let count = engine.register_creditors(creditors);
    ApiResponse::ok(format!("Registered {} creditors", count), count)
}

/// 运行一轮候选生成 (评分在阻塞线程池执行)
pub async fn run_match(State(engine): State<Arc<MatchEngine>>) -> Response {
    match tokio::task::spawn_blocking(move || engine.run_pass()).await {
        Ok(summary) => {
            let message = match &summary.abandon_reason {
                Some(reason) => format!("Pass abandoned: {}", reason),
                None => format!("Created {} proposals", summary.proposals_created),
            };
            ApiResponse::ok(message, summary)
        }
        Err(e) => {
            tracing::error!("生成轮次执行失败: {}", e);
            internal_error(format!("Error: {}", e))
        }
    }
}

/// 活动提案列表
pub async fn list_proposals(State(engine): State<Arc<MatchEngine>>) -> Json<Vec<ProposalView>> {
    Json(engine.active_views())
}

/// 人工指定配对
pub async fn create_proposal(
    State(engine): State<Arc<MatchEngine>>,
    Json(req): Json<ManualProposalRequest>,
) -> Result<Json<Proposal>, MatchError> {
    let proposal = engine.propose_manual(
        &VoucherId::new(req.voucher_id),
        &DocumentId::new(req.document_id),
    )?;
    Ok(Json(proposal))
}

pub async fn confirm_proposal(
    State(engine): State<Arc<MatchEngine>>,
    Path(id): Path<u64>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<DecisionOutcome>, MatchError> {
    Ok(Json(engine.confirm(ProposalId(id), &req.actor)?))
}

pub async fn discard_proposal(
    State(engine): State<Arc<MatchEngine>>,
    Path(id): Path<u64>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<DecisionOutcome>, MatchError> {
    Ok(Json(engine.discard(ProposalId(id), &req.actor)?))
}

/// 凭证当前的活动提案
pub async fn voucher_proposal(
    State(engine): State<Arc<MatchEngine>>,
    Path(id): Path<String>,
) -> Result<Json<Proposal>, MatchError> {
    let voucher_id = VoucherId::new(id);
    engine
        .proposal_for(&voucher_id)
        .map(Json)
        .ok_or_else(|| MatchError::NotFound {
            entity: "proposal for voucher",
            id: voucher_id.to_string(),
        })
}

/// 凭证的全部候选 (人工挑选用，评分在阻塞线程池执行)
pub async fn voucher_candidates(
    State(engine): State<Arc<MatchEngine>>,
    Path(id): Path<String>,
) -> Response {
    let voucher_id = VoucherId::new(id);
    match tokio::task::spawn_blocking(move || engine.candidates_for(&voucher_id)).await {
        Ok(Ok(candidates)) => (StatusCode::OK, Json(candidates)).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!("候选评分执行失败: {}", e);
            internal_error(format!("Error: {}", e))
        }
    }
}

pub async fn reject_voucher(
    State(engine): State<Arc<MatchEngine>>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<AuditEvent>, MatchError> {
    Ok(Json(engine.reject(&VoucherId::new(id), &req.actor)?))
}

pub async fn reopen_voucher(
    State(engine): State<Arc<MatchEngine>>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<AuditEvent>, MatchError> {
    Ok(Json(engine.reopen(&VoucherId::new(id), &req.actor)?))
}

/// 审计事件 (可按序号增量拉取)
pub async fn audit_events(
    State(engine): State<Arc<MatchEngine>>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditEvent>> {
    Json(engine.audit_events(query.since))
}

/// 审计日志 CSV 导出
pub async fn audit_export(State(engine): State<Arc<MatchEngine>>) -> Response {
    match engine.audit_csv() {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv,
        )
            .into_response(),
        Err(e) => internal_error(format!("Error: {}", e)),
    }
}

/// 已确认匹配 (凭证号 → 单据列表)
pub async fn confirmed_matches(State(engine): State<Arc<MatchEngine>>) -> Json<MatchInfo> {
    Json(engine.confirmed_matches())
}

pub async fn stats(State(engine): State<Arc<MatchEngine>>) -> Json<EngineStats> {
    Json(engine.stats())
}
