use crate::error::{MatchError, MatchResult, RecordKind};
use crate::models::{
    Creditor, Document, DocumentId, DocumentRecord, DocumentStatus, Voucher, VoucherId,
    VoucherRecord, VoucherStatus,
};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

/// 记录仓库: 保存录入的凭证、单据及债权人别名表
///
/// 记录只追加不删除；状态只能经由对账状态机变更。
/// 每次变更递增 `revision`，生成轮次据此判断快照是否过期。
#[derive(Debug, Default)]
pub struct RecordStore {
    vouchers: IndexMap<VoucherId, Voucher>,
    documents: IndexMap<DocumentId, Document>,
    creditors: HashMap<i64, Creditor>,
    revision: u64,
}

/// 生成轮次使用的只读快照
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub revision: u64,
    /// 状态为 Unmatched 的凭证
    pub vouchers: Vec<Voucher>,
    /// 状态为 Available 的单据
    pub documents: Vec<Document>,
    pub creditors: HashMap<i64, Creditor>,
}

/// 仓库计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub vouchers_unmatched: usize,
    pub vouchers_proposed: usize,
    pub vouchers_matched: usize,
    pub vouchers_rejected: usize,
    pub documents_available: usize,
    pub documents_reserved: usize,
    pub documents_consumed: usize,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 追加凭证，ID 重复时拒绝
    pub fn insert_voucher(&mut self, record: VoucherRecord) -> MatchResult<()> {
        if self.vouchers.contains_key(&record.id) {
            return Err(MatchError::DuplicateRecord {
                kind: RecordKind::Voucher,
                id: record.id.to_string(),
            });
        }
        let voucher = Voucher::from(record);
        self.vouchers.insert(voucher.id.clone(), voucher);
        self.revision += 1;
        Ok(())
    }

    /// 追加单据，ID 重复时拒绝
    pub fn insert_document(&mut self, record: DocumentRecord) -> MatchResult<()> {
        if self.documents.contains_key(&record.id) {
            return Err(MatchError::DuplicateRecord {
                kind: RecordKind::Document,
                id: record.id.to_string(),
            });
        }
        let document = Document::from(record);
        self.documents.insert(document.id.clone(), document);
        self.revision += 1;
        Ok(())
    }

    /// 登记/替换债权人别名表项
    pub fn upsert_creditor(&mut self, creditor: Creditor) {
        self.creditors.insert(creditor.id, creditor);
        self.revision += 1;
    }

    pub fn voucher(&self, id: &VoucherId) -> Option<&Voucher> {
        self.vouchers.get(id)
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn creditor(&self, id: i64) -> Option<&Creditor> {
        self.creditors.get(&id)
    }

    pub fn creditors(&self) -> &HashMap<i64, Creditor> {
        &self.creditors
    }

    /// 按录入顺序遍历凭证
    pub fn vouchers(&self) -> impl Iterator<Item = &Voucher> {
        self.vouchers.values()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub(crate) fn set_voucher_status(
        &mut self,
        id: &VoucherId,
        status: VoucherStatus,
    ) -> MatchResult<()> {
        let voucher = self
            .vouchers
            .get_mut(id)
            .ok_or_else(|| MatchError::voucher_not_found(id))?;
        voucher.status = status;
        self.revision += 1;
        Ok(())
    }

    pub(crate) fn set_document_status(
        &mut self,
        id: &DocumentId,
        status: DocumentStatus,
    ) -> MatchResult<()> {
        let document = self
            .documents
            .get_mut(id)
            .ok_or_else(|| MatchError::document_not_found(id))?;
        document.status = status;
        self.revision += 1;
        Ok(())
    }

    /// 截取生成轮次所需的可匹配记录
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            revision: self.revision,
            vouchers: self
                .vouchers
                .values()
                .filter(|v| v.status == VoucherStatus::Unmatched)
                .cloned()
                .collect(),
            documents: self
                .documents
                .values()
                .filter(|d| d.status == DocumentStatus::Available)
                .cloned()
                .collect(),
            creditors: self.creditors.clone(),
        }
    }

    pub fn counts(&self) -> StoreCounts {
        let mut counts = StoreCounts::default();
        for v in self.vouchers.values() {
            match v.status {
                VoucherStatus::Unmatched => counts.vouchers_unmatched += 1,
                VoucherStatus::Proposed => counts.vouchers_proposed += 1,
                VoucherStatus::Matched => counts.vouchers_matched += 1,
                VoucherStatus::Rejected => counts.vouchers_rejected += 1,
            }
        }
        for d in self.documents.values() {
            match d.status {
                DocumentStatus::Available => counts.documents_available += 1,
                DocumentStatus::Reserved => counts.documents_reserved += 1,
                DocumentStatus::Consumed => counts.documents_consumed += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn voucher(id: &str) -> VoucherRecord {
        VoucherRecord {
            id: VoucherId::new(id),
            amount: Some(BigDecimal::from_str("125.00").expect("decimal")),
            date: None,
            reference: None,
            counterparty: None,
            creditor_id: None,
            text: None,
        }
    }

    fn document(id: &str) -> DocumentRecord {
        DocumentRecord {
            id: DocumentId::new(id),
            amounts: vec![],
            dates: vec![],
            reference: Some("INV-1".to_string()),
            vendors: vec!["  Vendor A  ".to_string(), "   ".to_string()],
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut store = RecordStore::new();
        store.insert_voucher(voucher("0001")).expect("first insert");
        let err = store.insert_voucher(voucher("0001")).unwrap_err();
        assert!(matches!(err, MatchError::DuplicateRecord { kind: RecordKind::Voucher, .. }));

        store.insert_document(document("a.pdf")).expect("first insert");
        assert!(store.insert_document(document("a.pdf")).is_err());
    }

    #[test]
    fn ingested_records_start_unmatched_and_available() {
        let mut store = RecordStore::new();
        store.insert_voucher(voucher("0001")).expect("insert");
        store.insert_document(document("a.pdf")).expect("insert");

        let v = store.voucher(&VoucherId::new("0001")).expect("voucher");
        assert_eq!(v.status, VoucherStatus::Unmatched);
        let d = store.document(&DocumentId::new("a.pdf")).expect("document");
        assert_eq!(d.status, DocumentStatus::Available);
        assert_eq!(d.vendors, vec!["Vendor A".to_string()]);
    }

    #[test]
    fn snapshot_only_contains_eligible_records() {
        let mut store = RecordStore::new();
        store.insert_voucher(voucher("0001")).expect("insert");
        store.insert_voucher(voucher("0002")).expect("insert");
        store.insert_document(document("a.pdf")).expect("insert");
        store.insert_document(document("b.pdf")).expect("insert");

        store
            .set_voucher_status(&VoucherId::new("0002"), VoucherStatus::Matched)
            .expect("status");
        store
            .set_document_status(&DocumentId::new("a.pdf"), DocumentStatus::Consumed)
            .expect("status");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.revision, store.revision());
        assert_eq!(snapshot.vouchers.len(), 1);
        assert_eq!(snapshot.vouchers[0].id, VoucherId::new("0001"));
        assert_eq!(snapshot.documents.len(), 1);
        assert_eq!(snapshot.documents[0].id, DocumentId::new("b.pdf"));
    }

    #[test]
    fn every_mutation_bumps_revision() {
        let mut store = RecordStore::new();
        let start = store.revision();
        store.insert_voucher(voucher("0001")).expect("insert");
        let after_insert = store.revision();
        assert!(after_insert > start);
        store
            .set_voucher_status(&VoucherId::new("0001"), VoucherStatus::Proposed)
            .expect("status");
        assert!(store.revision() > after_insert);
        assert!(store
            .set_voucher_status(&VoucherId::new("missing"), VoucherStatus::Proposed)
            .is_err());
    }
}
