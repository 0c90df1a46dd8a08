use crate::models::{Proposal, VoucherId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 人工决议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Confirmed,
    Discarded,
    /// 凭证级: 放弃匹配该凭证
    Rejected,
    /// 凭证级: 重新开放已放弃的凭证
    Reopened,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Confirmed => write!(f, "confirmed"),
            Decision::Discarded => write!(f, "discarded"),
            Decision::Rejected => write!(f, "rejected"),
            Decision::Reopened => write!(f, "reopened"),
        }
    }
}

/// 审计事件 (只追加，不可变)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub sequence: u64,
    pub voucher_id: VoucherId,
    /// 决议时的提案快照；凭证级决议为空
    pub proposal: Option<Proposal>,
    pub decision: Decision,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}
