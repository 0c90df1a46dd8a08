use crate::error::{MatchError, MatchResult};
use crate::models::{
    AuditEvent, Decision, DocumentId, PassType, Proposal, ProposalId, VoucherId,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};

/// 提案账本: 活动提案的唯一权威来源
///
/// 约束: 同一凭证、同一单据任一时刻至多一条活动提案。
/// 决议后的提案移出活动集合，快照保留在审计日志中。
#[derive(Debug)]
pub struct ProposalLedger {
    active: BTreeMap<ProposalId, Proposal>,
    by_voucher: HashMap<VoucherId, ProposalId>,
    by_document: HashMap<DocumentId, ProposalId>,
    next_id: u64,
    audit: Vec<AuditEvent>,
}

impl Default for ProposalLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ProposalLedger {
    pub fn new() -> Self {
        Self {
            active: BTreeMap::new(),
            by_voucher: HashMap::new(),
            by_document: HashMap::new(),
            next_id: 1,
            audit: Vec::new(),
        }
    }

    /// 登记提案；凭证或单据已有活动提案时返回 Conflict
    pub fn propose(
        &mut self,
        voucher_id: VoucherId,
        document_id: DocumentId,
        pass_type: PassType,
        score: f64,
    ) -> MatchResult<Proposal> {
        if let Some(existing) = self.by_voucher.get(&voucher_id) {
            return Err(MatchError::Conflict(format!(
                "voucher {} already has active proposal {}",
                voucher_id, existing
            )));
        }
        if let Some(existing) = self.by_document.get(&document_id) {
            return Err(MatchError::Conflict(format!(
                "document {} already has active proposal {}",
                document_id, existing
            )));
        }

        let id = ProposalId(self.next_id);
        self.next_id += 1;

        let proposal = Proposal {
            id,
            voucher_id: voucher_id.clone(),
            document_id: document_id.clone(),
            pass_type,
            score,
        };
        self.by_voucher.insert(voucher_id, id);
        self.by_document.insert(document_id, id);
        self.active.insert(id, proposal.clone());
        Ok(proposal)
    }

    /// 凭证的活动提案
    pub fn get(&self, voucher_id: &VoucherId) -> Option<&Proposal> {
        self.by_voucher
            .get(voucher_id)
            .and_then(|id| self.active.get(id))
    }

    pub fn get_by_id(&self, id: ProposalId) -> Option<&Proposal> {
        self.active.get(&id)
    }

    pub fn is_voucher_claimed(&self, voucher_id: &VoucherId) -> bool {
        self.by_voucher.contains_key(voucher_id)
    }

    pub fn is_document_claimed(&self, document_id: &DocumentId) -> bool {
        self.by_document.contains_key(document_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// 活动提案，分数降序、凭证ID升序
    pub fn list_active(&self) -> Vec<Proposal> {
        let mut proposals: Vec<Proposal> = self.active.values().cloned().collect();
        proposals.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.voucher_id.cmp(&b.voucher_id))
        });
        proposals
    }

    /// 移出活动集合并追加审计事件；提案不在活动集合时返回 NotFound
    pub fn remove(
        &mut self,
        id: ProposalId,
        decision: Decision,
        actor: &str,
    ) -> MatchResult<(Proposal, AuditEvent)> {
        if !matches!(decision, Decision::Confirmed | Decision::Discarded) {
            return Err(MatchError::Conflict(format!(
                "decision {} does not apply to proposals",
                decision
            )));
        }
        let proposal = self
            .active
            .remove(&id)
            .ok_or_else(|| MatchError::proposal_not_found(id))?;
        self.by_voucher.remove(&proposal.voucher_id);
        self.by_document.remove(&proposal.document_id);

        let event = self.append(
            proposal.voucher_id.clone(),
            Some(proposal.clone()),
            decision,
            actor,
        );
        Ok((proposal, event))
    }

    /// 凭证级决议 (放弃 / 重新开放) 的审计记录
    pub fn record_voucher_decision(
        &mut self,
        voucher_id: VoucherId,
        decision: Decision,
        actor: &str,
    ) -> AuditEvent {
        self.append(voucher_id, None, decision, actor)
    }

    fn append(
        &mut self,
        voucher_id: VoucherId,
        proposal: Option<Proposal>,
        decision: Decision,
        actor: &str,
    ) -> AuditEvent {
        let event = AuditEvent {
            sequence: self.audit.len() as u64 + 1,
            voucher_id,
            proposal,
            decision,
            actor: actor.to_string(),
            timestamp: Utc::now(),
        };
        self.audit.push(event.clone());
        event
    }

    /// 序号大于 `since` 的审计事件 (序号从 1 开始)
    pub fn audit_events(&self, since: u64) -> &[AuditEvent] {
        let start = usize::try_from(since)
            .unwrap_or(usize::MAX)
            .min(self.audit.len());
        &self.audit[start..]
    }
}
