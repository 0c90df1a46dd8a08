pub mod handlers;

pub use handlers::*;

use crate::service::MatchEngine;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// 构建全部路由
pub fn router(engine: Arc<MatchEngine>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/records/vouchers", post(ingest_vouchers))
        .route("/api/records/documents", post(ingest_documents))
        .route("/api/records/creditors", post(register_creditors))
        .route("/api/match/run", post(run_match))
        .route("/api/proposals", get(list_proposals).post(create_proposal))
        .route("/api/proposals/:id/confirm", post(confirm_proposal))
        .route("/api/proposals/:id/discard", post(discard_proposal))
        .route("/api/vouchers/:id/proposal", get(voucher_proposal))
        .route("/api/vouchers/:id/candidates", get(voucher_candidates))
        .route("/api/vouchers/:id/reject", post(reject_voucher))
        .route("/api/vouchers/:id/reopen", post(reopen_voucher))
        .route("/api/audit", get(audit_events))
        .route("/api/audit/export", get(audit_export))
        .route("/api/matches", get(confirmed_matches))
        .route("/api/stats", get(stats))
        .with_state(engine)
}
