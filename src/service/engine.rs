use crate::config::MatchingConfig;
use crate::error::{MatchError, MatchResult};
use crate::models::{
    AuditEvent, Creditor, Decision, Document, DocumentId, DocumentRecord, DocumentStatus,
    PassType, Proposal, ProposalId, Voucher, VoucherId, VoucherRecord, VoucherStatus,
};
use crate::service::candidates::{Candidate, CandidateGenerator, GenerationOutput, RecordWarning};
use crate::service::classifier::MatchClassifier;
use crate::service::ledger::ProposalLedger;
use crate::service::reconciler::{DecisionOutcome, Reconciler};
use crate::store::{audit_csv_string, export_to_csv, RecordStore, StoreCounts};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 录入结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub accepted: usize,
    pub rejected: Vec<RecordWarning>,
}

/// 一轮生成的统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    pub vouchers_considered: usize,
    pub documents_considered: usize,
    pub proposals_created: usize,
    pub exact: usize,
    pub strong: usize,
    pub weak: usize,
    pub ambiguous: usize,
    /// 没有达到 weak 阈值候选的凭证数
    pub vouchers_without_proposal: usize,
    pub warnings: Vec<RecordWarning>,
    /// 本轮结果是否被整体作废 (快照过期或被取消)
    pub abandoned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abandon_reason: Option<String>,
}

impl PassSummary {
    fn count(&mut self, pass_type: PassType) {
        self.proposals_created += 1;
        match pass_type {
            PassType::Exact => self.exact += 1,
            PassType::Strong => self.strong += 1,
            PassType::Weak => self.weak += 1,
            PassType::Ambiguous => self.ambiguous += 1,
            PassType::Manual => {}
        }
    }
}

/// 已完成评分、尚未提交的生成轮次
#[derive(Debug)]
pub struct PreparedPass {
    revision: u64,
    vouchers_considered: usize,
    output: GenerationOutput,
}

impl PreparedPass {
    pub fn is_cancelled(&self) -> bool {
        self.output.cancelled
    }
}

/// 供展示层使用的提案视图
#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    pub proposal_id: ProposalId,
    pub pass_type: PassType,
    pub score: f64,
    pub requires_review: bool,
    pub voucher: Voucher,
    pub document: Document,
}

/// 已确认匹配 (matchinfo 格式: 凭证号 → 单据列表)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchInfo {
    pub matches: BTreeMap<String, Vec<String>>,
}

/// 引擎状态统计
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    #[serde(flatten)]
    pub records: StoreCounts,
    pub active_proposals: usize,
    pub audit_events: usize,
}

struct EngineState {
    store: RecordStore,
    ledger: ProposalLedger,
}

/// 匹配引擎: 记录仓库与提案账本的唯一持有者
///
/// 所有变更在同一把互斥锁下执行；评分在锁外对快照并行完成，
/// 提交时快照已过期则整轮作废。
pub struct MatchEngine {
    config: MatchingConfig,
    state: Mutex<EngineState>,
}

impl MatchEngine {
    pub fn new(config: MatchingConfig) -> MatchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(EngineState {
                store: RecordStore::new(),
                ledger: ProposalLedger::new(),
            }),
        })
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 录入凭证；重复ID记为拒绝，不影响其余记录
    pub fn ingest_vouchers(&self, records: Vec<VoucherRecord>) -> IngestSummary {
        let mut state = self.lock();
        let mut summary = IngestSummary::default();
        for record in records {
            match state.store.insert_voucher(record) {
                Ok(()) => summary.accepted += 1,
                Err(e) => {
                    tracing::warn!("凭证录入被拒绝: {}", e);
                    summary.rejected.extend(RecordWarning::from_error(&e));
                }
            }
        }
        tracing::info!(
            "录入凭证: 接受 {}, 拒绝 {}",
            summary.accepted,
            summary.rejected.len()
        );
        summary
    }

    /// 录入单据；重复ID记为拒绝
    pub fn ingest_documents(&self, records: Vec<DocumentRecord>) -> IngestSummary {
        let mut state = self.lock();
        let mut summary = IngestSummary::default();
        for record in records {
            match state.store.insert_document(record) {
                Ok(()) => summary.accepted += 1,
                Err(e) => {
                    tracing::warn!("单据录入被拒绝: {}", e);
                    summary.rejected.extend(RecordWarning::from_error(&e));
                }
            }
        }
        tracing::info!(
            "录入单据: 接受 {}, 拒绝 {}",
            summary.accepted,
            summary.rejected.len()
        );
        summary
    }

    /// 登记债权人别名表
    pub fn register_creditors(&self, creditors: Vec<Creditor>) -> usize {
        let mut state = self.lock();
        let count = creditors.len();
        for creditor in creditors {
            state.store.upsert_creditor(creditor);
        }
        tracing::info!("登记债权人 {} 个", count);
        count
    }

    /// 运行一轮候选生成并整批提交
    pub fn run_pass(&self) -> PassSummary {
        let prepared = self.prepare_pass(None);
        self.commit_pass(prepared)
    }

    /// 可取消的生成轮次；`cancel` 在提交前置位则整轮作废
    pub fn run_pass_with_cancel(&self, cancel: &AtomicBool) -> PassSummary {
        let prepared = self.prepare_pass(Some(cancel));
        self.commit_pass(prepared)
    }

    /// 阶段一: 截取快照 (持锁)，锁外并行评分
    pub fn prepare_pass(&self, cancel: Option<&AtomicBool>) -> PreparedPass {
        let snapshot = self.lock().store.snapshot();
        tracing::info!(
            "[Pass] 开始生成候选: {} 张凭证, {} 张单据 (revision {})",
            snapshot.vouchers.len(),
            snapshot.documents.len(),
            snapshot.revision
        );

        let generator = CandidateGenerator::new(&self.config);
        let output = generator.generate(&snapshot, cancel);
        PreparedPass {
            revision: snapshot.revision,
            vouchers_considered: output.ranked.len(),
            output,
        }
    }

    /// 阶段二: 持锁整批提交；快照过期或已取消时整体丢弃
    ///
    /// 凭证按首选分数降序、凭证ID升序依次认领单据，已被认领的单据从该凭证的
    /// 候选中剔除后重新分类。
    pub fn commit_pass(&self, prepared: PreparedPass) -> PassSummary {
        let PreparedPass {
            revision,
            vouchers_considered,
            output,
        } = prepared;

        let mut summary = PassSummary {
            vouchers_considered,
            documents_considered: output.documents_considered,
            warnings: output.warnings,
            ..PassSummary::default()
        };

        if output.cancelled {
            summary.abandoned = true;
            summary.abandon_reason = Some("pass cancelled".to_string());
            tracing::warn!("[Pass] 已取消，结果整体丢弃");
            return summary;
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if state.store.revision() != revision {
            summary.abandoned = true;
            summary.abandon_reason = Some(format!(
                "record store changed during pass (revision {} -> {})",
                revision,
                state.store.revision()
            ));
            tracing::warn!("[Pass] 快照已过期，结果整体丢弃");
            return summary;
        }

        let mut ranked = output.ranked;
        ranked.sort_by(|a, b| {
            let (sa, sb) = (a.top_score().unwrap_or(-1.0), b.top_score().unwrap_or(-1.0));
            sb.total_cmp(&sa).then_with(|| a.voucher_id.cmp(&b.voucher_id))
        });

        let classifier = MatchClassifier::new(&self.config);
        let mut claimed: HashSet<DocumentId> = HashSet::new();
        let mut reconciler = Reconciler::new(&mut state.store, &mut state.ledger);
        let total = ranked.len();

        for (idx, entry) in ranked.into_iter().enumerate() {
            let remaining: Vec<Candidate> = entry
                .candidates
                .into_iter()
                .filter(|c| !claimed.contains(&c.document_id))
                .collect();

            let Some(classified) = classifier.classify(&remaining) else {
                summary.vouchers_without_proposal += 1;
                continue;
            };

            match reconciler.propose(
                &entry.voucher_id,
                &classified.candidate.document_id,
                classified.pass_type,
                classified.candidate.score,
            ) {
                Ok(proposal) => {
                    claimed.insert(proposal.document_id.clone());
                    summary.count(proposal.pass_type);
                }
                Err(e) => {
                    tracing::warn!("[Pass] 凭证 {} 提案失败: {}", entry.voucher_id, e);
                    summary.vouchers_without_proposal += 1;
                }
            }

            let current = idx + 1;
            if current % 100 == 0 || current == 1 {
                tracing::info!(
                    "[Pass] 进度: {}/{}, 已生成提案: {}",
                    current,
                    total,
                    summary.proposals_created
                );
            }
        }

        tracing::info!(
            "[Pass] 完成 - 提案: {} (exact {}, strong {}, weak {}, ambiguous {}), 无提案凭证: {}, 告警: {}",
            summary.proposals_created,
            summary.exact,
            summary.strong,
            summary.weak,
            summary.ambiguous,
            summary.vouchers_without_proposal,
            summary.warnings.len()
        );
        summary
    }

    /// 活动提案 (账本顺序)
    pub fn list_active(&self) -> Vec<Proposal> {
        self.lock().ledger.list_active()
    }

    /// 活动提案连同凭证、单据详情
    pub fn active_views(&self) -> Vec<ProposalView> {
        let state = self.lock();
        state
            .ledger
            .list_active()
            .into_iter()
            .filter_map(|p| {
                let voucher = state.store.voucher(&p.voucher_id)?.clone();
                let document = state.store.document(&p.document_id)?.clone();
                Some(ProposalView {
                    proposal_id: p.id,
                    pass_type: p.pass_type,
                    score: p.score,
                    requires_review: p.pass_type.requires_review(),
                    voucher,
                    document,
                })
            })
            .collect()
    }

    pub fn proposal_for(&self, voucher_id: &VoucherId) -> Option<Proposal> {
        self.lock().ledger.get(voucher_id).cloned()
    }

    pub fn voucher(&self, voucher_id: &VoucherId) -> Option<Voucher> {
        self.lock().store.voucher(voucher_id).cloned()
    }

    pub fn document(&self, document_id: &DocumentId) -> Option<Document> {
        self.lock().store.document(document_id).cloned()
    }

    /// 某凭证对全部可用单据的评分 (不截断，供人工挑选)
    ///
    /// 持锁只截取凭证与可用单据，评分在锁外进行。
    pub fn candidates_for(&self, voucher_id: &VoucherId) -> MatchResult<Vec<Candidate>> {
        let (voucher, documents, creditors) = {
            let state = self.lock();
            let voucher = state
                .store
                .voucher(voucher_id)
                .cloned()
                .ok_or_else(|| MatchError::voucher_not_found(voucher_id))?;
            CandidateGenerator::validate_voucher(&voucher)?;

            let documents: Vec<Document> = state
                .store
                .documents()
                .filter(|d| d.status == DocumentStatus::Available)
                .filter(|d| CandidateGenerator::validate_document(d).is_ok())
                .cloned()
                .collect();
            let creditors: HashMap<i64, Creditor> = voucher
                .creditor_id
                .and_then(|id| state.store.creditor(id))
                .map(|c| (c.id, c.clone()))
                .into_iter()
                .collect();
            (voucher, documents, creditors)
        };

        let generator = CandidateGenerator::new(&self.config);
        Ok(generator.rank(&voucher, documents.iter(), &creditors, None))
    }

    /// 人工指定配对，记为 Manual 提案
    pub fn propose_manual(
        &self,
        voucher_id: &VoucherId,
        document_id: &DocumentId,
    ) -> MatchResult<Proposal> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let voucher = state
            .store
            .voucher(voucher_id)
            .ok_or_else(|| MatchError::voucher_not_found(voucher_id))?;
        let document = state
            .store
            .document(document_id)
            .ok_or_else(|| MatchError::document_not_found(document_id))?;
        let creditor = voucher
            .creditor_id
            .and_then(|id| state.store.creditor(id));
        let score = CandidateGenerator::new(&self.config)
            .score(voucher, document, creditor)
            .score;

        let proposal = Reconciler::new(&mut state.store, &mut state.ledger).propose(
            voucher_id,
            document_id,
            PassType::Manual,
            score,
        )?;
        tracing::info!(
            "人工提案 {}: 凭证 {} → 单据 {} (score {:.4})",
            proposal.id,
            voucher_id,
            document_id,
            score
        );
        Ok(proposal)
    }

    pub fn confirm(&self, id: ProposalId, actor: &str) -> MatchResult<DecisionOutcome> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let outcome = Reconciler::new(&mut state.store, &mut state.ledger).confirm(id, actor)?;
        tracing::info!(
            "确认提案 {}: 凭证 {} → 单据 {} ({}, by {})",
            id,
            outcome.proposal.voucher_id,
            outcome.proposal.document_id,
            outcome.proposal.pass_type,
            actor
        );
        Ok(outcome)
    }

    pub fn discard(&self, id: ProposalId, actor: &str) -> MatchResult<DecisionOutcome> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let outcome = Reconciler::new(&mut state.store, &mut state.ledger).discard(id, actor)?;
        tracing::info!(
            "驳回提案 {}: 凭证 {} 重新待匹配 (by {})",
            id,
            outcome.proposal.voucher_id,
            actor
        );
        Ok(outcome)
    }

    pub fn reject(&self, voucher_id: &VoucherId, actor: &str) -> MatchResult<AuditEvent> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let event = Reconciler::new(&mut state.store, &mut state.ledger).reject(voucher_id, actor)?;
        tracing::info!("放弃凭证 {} (by {})", voucher_id, actor);
        Ok(event)
    }

    pub fn reopen(&self, voucher_id: &VoucherId, actor: &str) -> MatchResult<AuditEvent> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let event = Reconciler::new(&mut state.store, &mut state.ledger).reopen(voucher_id, actor)?;
        tracing::info!("重新开放凭证 {} (by {})", voucher_id, actor);
        Ok(event)
    }

    /// 序号大于 `since` 的审计事件
    pub fn audit_events(&self, since: u64) -> Vec<AuditEvent> {
        self.lock().ledger.audit_events(since).to_vec()
    }

    /// 审计日志的 CSV 文本
    pub fn audit_csv(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let events = self.audit_events(0);
        audit_csv_string(&events)
    }

    /// 导出审计日志到文件
    pub fn export_audit(
        &self,
        output_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let events = self.audit_events(0);
        export_to_csv(&events, output_path)?;
        tracing::info!("审计日志已导出: {} 条 → {}", events.len(), output_path.display());
        Ok(())
    }

    /// 已确认的匹配，按凭证号排序
    pub fn confirmed_matches(&self) -> MatchInfo {
        let state = self.lock();
        let mut info = MatchInfo::default();
        for event in state.ledger.audit_events(0) {
            if event.decision != Decision::Confirmed {
                continue;
            }
            if let Some(proposal) = &event.proposal {
                let matched = state
                    .store
                    .voucher(&proposal.voucher_id)
                    .is_some_and(|v| v.status == VoucherStatus::Matched);
                if matched {
                    info.matches
                        .entry(proposal.voucher_id.to_string())
                        .or_default()
                        .push(proposal.document_id.to_string());
                }
            }
        }
        info
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.lock();
        EngineStats {
            records: state.store.counts(),
            active_proposals: state.ledger.active_count(),
            audit_events: state.ledger.audit_events(0).len(),
        }
    }
}
