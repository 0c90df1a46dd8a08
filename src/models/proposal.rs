use crate::models::{DocumentId, VoucherId};
use serde::{Deserialize, Serialize};

/// 提案ID (账本单调递增分配，不复用)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub u64);

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 匹配质量类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassType {
    Exact,
    Strong,
    Weak,
    /// 前两名候选分差过小，需要人工明确选择
    Ambiguous,
    /// 人工指定的配对
    Manual,
}

impl PassType {
    pub fn label(&self) -> &'static str {
        match self {
            PassType::Exact => "exact",
            PassType::Strong => "strong",
            PassType::Weak => "weak",
            PassType::Ambiguous => "ambiguous",
            PassType::Manual => "manual",
        }
    }

    /// 是否需要二次审核
    pub fn requires_review(&self) -> bool {
        matches!(self, PassType::Ambiguous | PassType::Weak)
    }
}

impl std::fmt::Display for PassType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 待决提案 (voucher, document, pass_type, score)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub voucher_id: VoucherId,
    pub document_id: DocumentId,
    pub pass_type: PassType,
    pub score: f64,
}
