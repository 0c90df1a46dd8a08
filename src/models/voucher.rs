use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 凭证ID (凭证号，如 "0953")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherId(pub String);

impl VoucherId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VoucherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 凭证状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Unmatched,
    Proposed,
    Matched,
    Rejected,
}

/// 录入的凭证记录 (不含状态)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub id: VoucherId,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub creditor_id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
}

/// 凭证 (银行/债权人付款记录)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub amount: Option<BigDecimal>,
    pub date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub counterparty: Option<String>,
    pub creditor_id: Option<i64>,
    pub text: Option<String>,
    pub status: VoucherStatus,
}

impl From<VoucherRecord> for Voucher {
    fn from(record: VoucherRecord) -> Self {
        Self {
            id: record.id,
            amount: record.amount,
            date: record.date,
            reference: record.reference,
            counterparty: record.counterparty,
            creditor_id: record.creditor_id,
            text: record.text,
            status: VoucherStatus::Unmatched,
        }
    }
}
