use crate::config::MatchingConfig;
use crate::error::{MatchError, MatchResult, RecordKind};
use crate::models::{Creditor, Document, DocumentId, Voucher, VoucherId};
use crate::store::StoreSnapshot;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

/// 各维度得分 (均在 [0, 1])
///
/// 参考号、对方名称只在双方都有该属性时计分 (`None` 不计入权重)；
/// 金额、日期为凭证必需属性，始终计入。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub amount: f64,
    pub reference: Option<f64>,
    pub counterparty: Option<f64>,
    pub date: f64,
    /// 单据日期落在订阅别名的扣费计划上
    pub on_schedule: bool,
}

/// 候选单据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub document_id: DocumentId,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// 单张凭证的排序候选
#[derive(Debug, Clone, Serialize)]
pub struct VoucherCandidates {
    pub voucher_id: VoucherId,
    pub candidates: Vec<Candidate>,
}

impl VoucherCandidates {
    pub fn top_score(&self) -> Option<f64> {
        self.candidates.first().map(|c| c.score)
    }
}

/// 被跳过记录的告警
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordWarning {
    pub kind: RecordKind,
    pub id: String,
    pub reason: String,
}

impl RecordWarning {
    pub fn from_error(err: &MatchError) -> Option<Self> {
        match err {
            MatchError::InvalidRecord { kind, id, reason } => Some(Self {
                kind: *kind,
                id: id.clone(),
                reason: reason.clone(),
            }),
            MatchError::DuplicateRecord { kind, id } => Some(Self {
                kind: *kind,
                id: id.clone(),
                reason: "duplicate id".to_string(),
            }),
            _ => None,
        }
    }
}

/// 生成结果
#[derive(Debug, Default)]
pub struct GenerationOutput {
    pub ranked: Vec<VoucherCandidates>,
    pub warnings: Vec<RecordWarning>,
    pub documents_considered: usize,
    pub cancelled: bool,
}

/// 日期差分档: ≤7天 1.0, ≤15天 0.5, ≤30天 0.25
const DATE_BANDS: [(i64, f64); 3] = [(7, 1.0), (15, 0.5), (30, 0.25)];

/// 订阅账单日期允许的偏差 (天)
const SCHEDULE_TOLERANCE_DAYS: i64 = 7;

/// 参考号仅以完整词元包含另一方时的得分
const REFERENCE_TOKEN_SCORE: f64 = 0.8;

/// 金额比较精度 (小数位)
const AMOUNT_SCALE: i64 = 2;

/// 候选生成器: 对快照只读评分，不修改记录仓库
pub struct CandidateGenerator<'a> {
    config: &'a MatchingConfig,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(config: &'a MatchingConfig) -> Self {
        Self { config }
    }

    /// 凭证必需属性: ID、金额、日期
    pub fn validate_voucher(voucher: &Voucher) -> MatchResult<()> {
        let invalid = |reason: &str| MatchError::InvalidRecord {
            kind: RecordKind::Voucher,
            id: voucher.id.to_string(),
            reason: reason.to_string(),
        };
        if voucher.id.as_str().trim().is_empty() {
            return Err(invalid("empty id"));
        }
        if voucher.amount.is_none() {
            return Err(invalid("missing amount"));
        }
        if voucher.date.is_none() {
            return Err(invalid("missing date"));
        }
        Ok(())
    }

    /// 单据必需属性: ID，且至少有金额、参考号或供应商行之一
    pub fn validate_document(document: &Document) -> MatchResult<()> {
        let invalid = |reason: &str| MatchError::InvalidRecord {
            kind: RecordKind::Document,
            id: document.id.to_string(),
            reason: reason.to_string(),
        };
        if document.id.as_str().trim().is_empty() {
            return Err(invalid("empty id"));
        }
        let has_reference = document
            .reference
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        if document.amounts.is_empty() && !has_reference && document.vendors.is_empty() {
            return Err(invalid("no amounts, reference or vendor lines"));
        }
        Ok(())
    }

    /// 计算凭证与单据的各维度得分
    pub fn breakdown(
        &self,
        voucher: &Voucher,
        document: &Document,
        creditor: Option<&Creditor>,
    ) -> ScoreBreakdown {
        let on_schedule = match (voucher.date, creditor) {
            (Some(date), Some(creditor)) => on_schedule(date, document, creditor),
            _ => false,
        };
        let date = if on_schedule {
            1.0
        } else {
            voucher
                .date
                .map(|d| date_score(d, &document.dates))
                .unwrap_or(0.0)
        };
        ScoreBreakdown {
            amount: amount_score(voucher, document),
            reference: reference_score(voucher.reference.as_deref(), document.reference.as_deref()),
            counterparty: counterparty_score(voucher, document, creditor),
            date,
            on_schedule,
        }
    }

    /// 加权总分: 按参与计分属性的权重和归一化到 [0, 1]
    pub fn weighted(&self, breakdown: &ScoreBreakdown) -> f64 {
        let w = &self.config.weights;
        let factors = [
            (w.amount, Some(breakdown.amount)),
            (w.reference, breakdown.reference),
            (w.counterparty, breakdown.counterparty),
            (w.date, Some(breakdown.date)),
        ];
        let (sum, total) = factors
            .iter()
            .filter_map(|(weight, score)| score.map(|s| (*weight, s)))
            .fold((0.0, 0.0), |(sum, total), (weight, s)| {
                (sum + weight * s, total + weight)
            });
        if total <= 0.0 {
            return 0.0;
        }
        (sum / total).clamp(0.0, 1.0)
    }

    pub fn score(&self, voucher: &Voucher, document: &Document, creditor: Option<&Creditor>) -> Candidate {
        let breakdown = self.breakdown(voucher, document, creditor);
        Candidate {
            document_id: document.id.clone(),
            score: self.weighted(&breakdown),
            breakdown,
        }
    }

    /// 对单张凭证排序候选: 分数降序，同分按单据ID升序；0 分不作为候选
    pub fn rank<'d>(
        &self,
        voucher: &Voucher,
        documents: impl IntoIterator<Item = &'d Document>,
        creditors: &HashMap<i64, Creditor>,
        limit: Option<usize>,
    ) -> Vec<Candidate> {
        let creditor = voucher.creditor_id.and_then(|id| creditors.get(&id));
        let mut candidates: Vec<Candidate> = documents
            .into_iter()
            .map(|doc| self.score(voucher, doc, creditor))
            .filter(|c| c.score > 0.0)
            .collect();

        candidates.sort_by(compare_candidates);
        if let Some(limit) = limit {
            candidates.truncate(limit);
        }
        candidates
    }

    /// 对快照中全部未匹配凭证生成 top-K 候选 (按凭证并行)
    ///
    /// 缺少必需属性的记录被跳过并记录告警；`cancel` 置位后结果整体作废。
    pub fn generate(&self, snapshot: &StoreSnapshot, cancel: Option<&AtomicBool>) -> GenerationOutput {
        let mut warnings = Vec::new();

        let documents: Vec<&Document> = snapshot
            .documents
            .iter()
            .filter(|doc| match Self::validate_document(doc) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("跳过单据: {}", e);
                    warnings.extend(RecordWarning::from_error(&e));
                    false
                }
            })
            .collect();

        let vouchers: Vec<&Voucher> = snapshot
            .vouchers
            .iter()
            .filter(|v| match Self::validate_voucher(v) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("跳过凭证: {}", e);
                    warnings.extend(RecordWarning::from_error(&e));
                    false
                }
            })
            .collect();

        let is_cancelled = || cancel.is_some_and(|flag| flag.load(AtomicOrdering::Relaxed));
        let top_k = self.config.top_k;

        let ranked: Vec<Option<VoucherCandidates>> = vouchers
            .par_iter()
            .map(|voucher| {
                if is_cancelled() {
                    return None;
                }
                Some(VoucherCandidates {
                    voucher_id: voucher.id.clone(),
                    candidates: self.rank(
                        voucher,
                        documents.iter().copied(),
                        &snapshot.creditors,
                        Some(top_k),
                    ),
                })
            })
            .collect();

        if is_cancelled() || ranked.iter().any(Option::is_none) {
            return GenerationOutput {
                warnings,
                documents_considered: documents.len(),
                cancelled: true,
                ..GenerationOutput::default()
            };
        }

        GenerationOutput {
            ranked: ranked.into_iter().flatten().collect(),
            warnings,
            documents_considered: documents.len(),
            cancelled: false,
        }
    }
}

/// 分数降序，同分按单据ID升序
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.document_id.cmp(&b.document_id))
}

fn amount_score(voucher: &Voucher, document: &Document) -> f64 {
    let Some(amount) = voucher.amount.as_ref() else {
        return 0.0;
    };
    let target = amount.round(AMOUNT_SCALE);
    if document.amounts.iter().any(|a| a.round(AMOUNT_SCALE) == target) {
        1.0
    } else {
        0.0
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// 去掉分隔符后的小写字母数字串
fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// 参考号按标识符比较: 完全相同 1.0，一方的全部词元出现在另一方中为部分得分，
/// 其余为 0。相差一个字符的参考号是不同的单据。
fn reference_score(voucher_ref: Option<&str>, document_ref: Option<&str>) -> Option<f64> {
    let a = voucher_ref.map(compact).filter(|r| !r.is_empty())?;
    let b = document_ref.map(compact).filter(|r| !r.is_empty())?;
    if a == b {
        return Some(1.0);
    }

    let tokens = |text: &str| -> Vec<String> {
        text.split_whitespace()
            .map(compact)
            .filter(|t| !t.is_empty())
            .collect()
    };
    let (ta, tb) = (
        voucher_ref.map(tokens).unwrap_or_default(),
        document_ref.map(tokens).unwrap_or_default(),
    );
    let (shorter, longer) = if ta.len() <= tb.len() { (&ta, &tb) } else { (&tb, &ta) };
    if !shorter.is_empty() && shorter.iter().all(|t| longer.contains(t)) {
        Some(REFERENCE_TOKEN_SCORE)
    } else {
        Some(0.0)
    }
}

fn counterparty_score(
    voucher: &Voucher,
    document: &Document,
    creditor: Option<&Creditor>,
) -> Option<f64> {
    if document.vendors.is_empty() {
        return None;
    }
    if let Some(creditor) = creditor {
        if creditor.matches_any(&document.vendors) {
            return Some(1.0);
        }
    }

    let name = voucher
        .counterparty
        .as_deref()
        .or_else(|| creditor.map(|c| c.name.as_str()))
        .map(normalize)
        .filter(|n| !n.is_empty())?;

    let best = document
        .vendors
        .iter()
        .map(|line| {
            let line = normalize(line);
            if line == name {
                1.0
            } else {
                strsim::normalized_levenshtein(&name, &line)
            }
        })
        .fold(0.0, f64::max);
    Some(best)
}

/// 单据中离凭证日期最近的日期
fn closest_date(voucher_date: NaiveDate, document_dates: &[NaiveDate]) -> Option<NaiveDate> {
    document_dates
        .iter()
        .copied()
        .min_by_key(|d| ((*d - voucher_date).num_days().abs(), *d))
}

/// 订阅匹配: 单据供应商行命中订阅别名，且最近日期与某个账单日期相差不超过 7 天
fn on_schedule(voucher_date: NaiveDate, document: &Document, creditor: &Creditor) -> bool {
    let Some(closest) = closest_date(voucher_date, &document.dates) else {
        return false;
    };
    creditor
        .subscription_aliases(&document.vendors)
        .flat_map(|alias| alias.billing_dates(voucher_date))
        .any(|expected| (closest - expected).num_days().abs() <= SCHEDULE_TOLERANCE_DAYS)
}

fn date_score(voucher_date: NaiveDate, document_dates: &[NaiveDate]) -> f64 {
    let Some(closest) = closest_date(voucher_date, document_dates)
        .map(|d| (d - voucher_date).num_days().abs())
    else {
        return 0.0;
    };
    DATE_BANDS
        .iter()
        .find(|(days, _)| closest <= *days)
        .map(|(_, score)| *score)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingFrequency, CreditorAlias, DocumentStatus, PassType, VoucherStatus};
    use crate::service::classifier::MatchClassifier;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn voucher(id: &str, amount: &str, reference: &str) -> Voucher {
        Voucher {
            id: VoucherId::new(id),
            amount: Some(BigDecimal::from_str(amount).expect("decimal")),
            date: Some(date(2024, 11, 15)),
            reference: Some(reference.to_string()),
            counterparty: Some("Acme".to_string()),
            creditor_id: None,
            text: None,
            status: VoucherStatus::Unmatched,
        }
    }

    fn document(id: &str, amount: &str, reference: &str) -> Document {
        Document {
            id: DocumentId::new(id),
            amounts: vec![BigDecimal::from_str(amount).expect("decimal")],
            dates: vec![date(2024, 11, 15)],
            reference: Some(reference.to_string()),
            vendors: vec!["ACME".to_string()],
            status: DocumentStatus::Available,
        }
    }

    #[test]
    fn identical_attributes_score_one() {
        let config = MatchingConfig::default();
        let generator = CandidateGenerator::new(&config);
        let c = generator.score(
            &voucher("V1", "100.00", "ACME-100"),
            &document("D1", "100", "acme-100"),
            None,
        );
        assert!((c.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn amount_compares_at_two_decimals() {
        let v = voucher("V1", "1250.004", "X");
        let d = document("D1", "1250.00", "Y");
        assert_eq!(amount_score(&v, &d), 1.0);
        let d = document("D1", "1250.10", "Y");
        assert_eq!(amount_score(&v, &d), 0.0);
    }

    #[test]
    fn date_bands_follow_closest_date() {
        let v = date(2024, 11, 15);
        assert_eq!(date_score(v, &[date(2024, 11, 20)]), 1.0);
        assert_eq!(date_score(v, &[date(2024, 11, 1)]), 0.5);
        assert_eq!(date_score(v, &[date(2024, 10, 20), date(2025, 1, 1)]), 0.25);
        assert_eq!(date_score(v, &[date(2024, 6, 1)]), 0.0);
        assert_eq!(date_score(v, &[]), 0.0);
    }

    #[test]
    fn creditor_alias_beats_fuzzy_name() {
        let mut v = voucher("V1", "10", "R");
        v.counterparty = None;
        v.creditor_id = Some(42);
        let mut d = document("D1", "10", "R");
        d.vendors = vec!["VENDOR A Nordic ApS".to_string()];
        let creditor = Creditor {
            id: 42,
            name: "Something else".to_string(),
            aliases: vec![CreditorAlias {
                prefix: "VENDOR A".to_string(),
                postfix: "ApS".to_string(),
                frequency: None,
                start_date: None,
            }],
        };
        assert_eq!(counterparty_score(&v, &d, Some(&creditor)), Some(1.0));
        assert_eq!(counterparty_score(&v, &d, None), None);

        v.counterparty = Some("Vendor B".to_string());
        let fuzzy = counterparty_score(&v, &d, None).expect("both sides present");
        assert!(fuzzy < 1.0);
    }

    #[test]
    fn references_compare_as_identifiers() {
        assert_eq!(reference_score(Some("ACME-100"), Some("acme 100")), Some(1.0));
        assert_eq!(reference_score(Some("ACME-100"), Some("ACME-101")), Some(0.0));
        assert_eq!(
            reference_score(Some("Invoice ACME-100"), Some("ACME-100")),
            Some(REFERENCE_TOKEN_SCORE)
        );
        assert_eq!(reference_score(Some("ACME-100"), None), None);
        assert_eq!(reference_score(Some(" - "), Some("ACME-100")), None);
    }

    #[test]
    fn absent_optional_attributes_leave_the_denominator() {
        let config = MatchingConfig::default();
        let generator = CandidateGenerator::new(&config);
        let mut v = voucher("V1", "100.00", "ACME-100");
        v.counterparty = None;
        let c = generator.score(&v, &document("D1", "100", "ACME-100"), None);
        assert_eq!(c.breakdown.counterparty, None);
        assert!((c.score - 1.0).abs() < 1e-9);

        v.reference = None;
        let c = generator.score(&v, &document("D1", "100", "ACME-100"), None);
        assert!((c.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn one_character_reference_difference_stays_exact() {
        let config = MatchingConfig::default();
        let generator = CandidateGenerator::new(&config);
        let classifier = MatchClassifier::new(&config);
        let docs = vec![
            document("D1", "100.00", "ACME-100"),
            document("D2", "100.00", "ACME-101"),
        ];

        let mut v = voucher("V1", "100.00", "ACME-100");
        for counterparty in [Some("Acme".to_string()), None] {
            v.counterparty = counterparty;
            let ranked = generator.rank(&v, docs.iter(), &HashMap::new(), None);
            assert_eq!(ranked[0].document_id.as_str(), "D1");
            let classified = classifier.classify(&ranked).expect("classified");
            assert_eq!(classified.pass_type, PassType::Exact);
            assert_eq!(classified.candidate.document_id.as_str(), "D1");
        }
    }

    #[test]
    fn monthly_subscription_date_counts_as_on_schedule() {
        let config = MatchingConfig::default();
        let generator = CandidateGenerator::new(&config);
        let creditor = Creditor {
            id: 9,
            name: "Streaming".to_string(),
            aliases: vec![CreditorAlias {
                prefix: "STREAMCO".to_string(),
                postfix: String::new(),
                frequency: Some(BillingFrequency::Monthly),
                start_date: Some(date(2024, 1, 20)),
            }],
        };
        let mut v = voucher("V1", "12.99", "");
        v.reference = None;
        v.counterparty = None;
        v.creditor_id = Some(9);

        // 2024-01-20 起每 30 天: ... 2024-10-16, 2024-11-15 ...
        let mut d = document("bill.pdf", "12.99", "");
        d.reference = None;
        d.vendors = vec!["STREAMCO Nordic".to_string()];
        d.dates = vec![date(2024, 10, 18)];

        let c = generator.score(&v, &d, Some(&creditor));
        assert!(c.breakdown.on_schedule);
        assert_eq!(c.breakdown.date, 1.0);
        assert!((c.score - 1.0).abs() < 1e-9);

        d.dates = vec![date(2024, 10, 31)];
        let c = generator.score(&v, &d, Some(&creditor));
        assert!(!c.breakdown.on_schedule);
        assert_eq!(c.breakdown.date, 0.5);

        let c = generator.score(&v, &d, None);
        assert!(!c.breakdown.on_schedule);
    }

    #[test]
    fn ranking_breaks_ties_by_document_id() {
        let config = MatchingConfig::default();
        let generator = CandidateGenerator::new(&config);
        let v = voucher("V1", "100", "ACME-100");
        let docs = vec![
            document("b.pdf", "100", "ACME-100"),
            document("a.pdf", "100", "ACME-100"),
            document("c.pdf", "999", "ZZZZ"),
        ];
        let ranked = generator.rank(&v, docs.iter(), &HashMap::new(), None);
        let ids: Vec<&str> = ranked.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a.pdf", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn rank_honours_limit_and_drops_zero_scores() {
        let config = MatchingConfig::default();
        let generator = CandidateGenerator::new(&config);
        let v = voucher("V1", "100", "ACME-100");
        let mut unrelated = document("z.pdf", "1", "qqqqqqqq");
        unrelated.vendors.clear();
        unrelated.dates.clear();
        let docs = vec![
            document("a.pdf", "100", "ACME-100"),
            document("b.pdf", "100", "ACME-101"),
            unrelated,
        ];
        let ranked = generator.rank(&v, docs.iter(), &HashMap::new(), Some(5));
        assert_eq!(ranked.len(), 2);
        let ranked = generator.rank(&v, docs.iter(), &HashMap::new(), Some(1));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].document_id.as_str(), "a.pdf");
    }

    #[test]
    fn generate_skips_invalid_records_with_warnings() {
        let config = MatchingConfig::default();
        let generator = CandidateGenerator::new(&config);
        let mut missing_amount = voucher("V2", "1", "R");
        missing_amount.amount = None;
        let mut empty_doc = document("empty.pdf", "1", "R");
        empty_doc.amounts.clear();
        empty_doc.reference = None;
        empty_doc.vendors.clear();

        let snapshot = StoreSnapshot {
            revision: 1,
            vouchers: vec![voucher("V1", "100", "ACME-100"), missing_amount],
            documents: vec![document("D1", "100", "ACME-100"), empty_doc],
            creditors: HashMap::new(),
        };
        let output = generator.generate(&snapshot, None);

        assert!(!output.cancelled);
        assert_eq!(output.ranked.len(), 1);
        assert_eq!(output.documents_considered, 1);
        assert_eq!(output.warnings.len(), 2);
        assert!(output
            .warnings
            .iter()
            .any(|w| w.kind == RecordKind::Voucher && w.id == "V2" && w.reason == "missing amount"));
        assert!(output
            .warnings
            .iter()
            .any(|w| w.kind == RecordKind::Document && w.id == "empty.pdf"));
    }

    #[test]
    fn generate_is_reproducible() {
        let config = MatchingConfig::default();
        let generator = CandidateGenerator::new(&config);
        let snapshot = StoreSnapshot {
            revision: 1,
            vouchers: (0..20)
                .map(|i| voucher(&format!("V{i:02}"), &format!("{}", 100 + i), "ACME"))
                .collect(),
            documents: (0..20)
                .map(|i| document(&format!("D{i:02}"), &format!("{}", 100 + i), "ACME"))
                .collect(),
            creditors: HashMap::new(),
        };
        let first = generator.generate(&snapshot, None);
        let second = generator.generate(&snapshot, None);
        let flatten = |o: &GenerationOutput| {
            o.ranked
                .iter()
                .map(|r| (r.voucher_id.clone(), r.candidates.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(flatten(&first), flatten(&second));
        assert_eq!(first.ranked[0].candidates.len(), config.top_k);
    }

    #[test]
    fn cancelled_generation_returns_nothing() {
        let config = MatchingConfig::default();
        let generator = CandidateGenerator::new(&config);
        let snapshot = StoreSnapshot {
            revision: 1,
            vouchers: vec![voucher("V1", "100", "ACME-100")],
            documents: vec![document("D1", "100", "ACME-100")],
            creditors: HashMap::new(),
        };
        let cancel = AtomicBool::new(true);
        let output = generator.generate(&snapshot, Some(&cancel));
        assert!(output.cancelled);
        assert!(output.ranked.is_empty());
    }
}
