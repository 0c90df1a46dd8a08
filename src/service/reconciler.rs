//! 对账状态机
//!
//! 提案状态: `Proposed → {Confirmed, Discarded}` (终态)。
//! 每个决议先完成全部校验再修改状态，失败的决议不留下任何痕迹。

use crate::error::{MatchError, MatchResult};
use crate::models::{
    AuditEvent, Decision, DocumentId, DocumentStatus, PassType, Proposal, ProposalId, VoucherId,
    VoucherStatus,
};
use crate::service::ledger::ProposalLedger;
use crate::store::RecordStore;
use serde::Serialize;

/// 决议结果
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub proposal: Proposal,
    pub event: AuditEvent,
    pub voucher_status: VoucherStatus,
    pub document_status: DocumentStatus,
}

/// 对账服务: 同时持有记录仓库与账本的可变借用，保证决议整体生效
pub struct Reconciler<'a> {
    store: &'a mut RecordStore,
    ledger: &'a mut ProposalLedger,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a mut RecordStore, ledger: &'a mut ProposalLedger) -> Self {
        Self { store, ledger }
    }

    /// 登记提案: 凭证 Unmatched → Proposed，单据 Available → Reserved
    pub fn propose(
        &mut self,
        voucher_id: &VoucherId,
        document_id: &DocumentId,
        pass_type: PassType,
        score: f64,
    ) -> MatchResult<Proposal> {
        let voucher = self
            .store
            .voucher(voucher_id)
            .ok_or_else(|| MatchError::voucher_not_found(voucher_id))?;
        if voucher.status != VoucherStatus::Unmatched {
            return Err(MatchError::Conflict(format!(
                "voucher {} is {:?}, expected Unmatched",
                voucher_id, voucher.status
            )));
        }
        let document = self
            .store
            .document(document_id)
            .ok_or_else(|| MatchError::document_not_found(document_id))?;
        if document.status != DocumentStatus::Available {
            return Err(MatchError::Conflict(format!(
                "document {} is {:?}, expected Available",
                document_id, document.status
            )));
        }

        let proposal =
            self.ledger
                .propose(voucher_id.clone(), document_id.clone(), pass_type, score)?;
        self.store
            .set_voucher_status(voucher_id, VoucherStatus::Proposed)?;
        self.store
            .set_document_status(document_id, DocumentStatus::Reserved)?;
        Ok(proposal)
    }

    /// 确认: 凭证 → Matched，单据 → Consumed
    pub fn confirm(&mut self, id: ProposalId, actor: &str) -> MatchResult<DecisionOutcome> {
        self.decide(id, Decision::Confirmed, actor)
    }

    /// 驳回: 凭证 → Unmatched (可再次参与匹配)，单据 → Available
    pub fn discard(&mut self, id: ProposalId, actor: &str) -> MatchResult<DecisionOutcome> {
        self.decide(id, Decision::Discarded, actor)
    }

    fn decide(
        &mut self,
        id: ProposalId,
        decision: Decision,
        actor: &str,
    ) -> MatchResult<DecisionOutcome> {
        let proposal = self
            .ledger
            .get_by_id(id)
            .ok_or_else(|| MatchError::proposal_not_found(id))?;
        let (voucher_id, document_id) = (proposal.voucher_id.clone(), proposal.document_id.clone());
        if self.store.voucher(&voucher_id).is_none() {
            return Err(MatchError::voucher_not_found(&voucher_id));
        }
        if self.store.document(&document_id).is_none() {
            return Err(MatchError::document_not_found(&document_id));
        }

        let (voucher_status, document_status) = match decision {
            Decision::Confirmed => (VoucherStatus::Matched, DocumentStatus::Consumed),
            _ => (VoucherStatus::Unmatched, DocumentStatus::Available),
        };

        let (proposal, event) = self.ledger.remove(id, decision, actor)?;
        self.store.set_voucher_status(&voucher_id, voucher_status)?;
        self.store
            .set_document_status(&document_id, document_status)?;

        Ok(DecisionOutcome {
            proposal,
            event,
            voucher_status,
            document_status,
        })
    }

    /// 放弃凭证: 仅限无活动提案的 Unmatched 凭证
    pub fn reject(&mut self, voucher_id: &VoucherId, actor: &str) -> MatchResult<AuditEvent> {
        self.transition_voucher(
            voucher_id,
            VoucherStatus::Unmatched,
            VoucherStatus::Rejected,
            Decision::Rejected,
            actor,
        )
    }

    /// 重新开放已放弃的凭证
    pub fn reopen(&mut self, voucher_id: &VoucherId, actor: &str) -> MatchResult<AuditEvent> {
        self.transition_voucher(
            voucher_id,
            VoucherStatus::Rejected,
            VoucherStatus::Unmatched,
            Decision::Reopened,
            actor,
        )
    }

    fn transition_voucher(
        &mut self,
        voucher_id: &VoucherId,
        from: VoucherStatus,
        to: VoucherStatus,
        decision: Decision,
        actor: &str,
    ) -> MatchResult<AuditEvent> {
        let voucher = self
            .store
            .voucher(voucher_id)
            .ok_or_else(|| MatchError::voucher_not_found(voucher_id))?;
        if let Some(active) = self.ledger.get(voucher_id) {
            return Err(MatchError::Conflict(format!(
                "voucher {} has active proposal {}",
                voucher_id, active.id
            )));
        }
        if voucher.status != from {
            return Err(MatchError::Conflict(format!(
                "voucher {} is {:?}, expected {:?}",
                voucher_id, voucher.status, from
            )));
        }

        self.store.set_voucher_status(voucher_id, to)?;
        Ok(self
            .ledger
            .record_voucher_decision(voucher_id.clone(), decision, actor))
    }
}
