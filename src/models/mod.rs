pub mod audit;
pub mod creditor;
pub mod document;
pub mod proposal;
pub mod voucher;

pub use audit::{AuditEvent, Decision};
pub use creditor::{BillingFrequency, Creditor, CreditorAlias};
pub use document::{Document, DocumentId, DocumentRecord, DocumentStatus};
pub use proposal::{PassType, Proposal, ProposalId};
pub use voucher::{Voucher, VoucherId, VoucherRecord, VoucherStatus};
