use crate::models::AuditEvent;
use std::io::Write;
use std::path::Path;

const AUDIT_HEADER: [&str; 9] = [
    "sequence",
    "proposal_id",
    "voucher_id",
    "document_id",
    "pass_type",
    "score",
    "decision",
    "actor",
    "timestamp",
];

/// 将审计事件写出为 CSV (首行为表头)
pub fn write_audit_csv<W: Write>(
    events: &[AuditEvent],
    writer: W,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(AUDIT_HEADER)?;

    for event in events {
        let (proposal_id, document_id, pass_type, score) = match &event.proposal {
            Some(p) => (
                p.id.to_string(),
                p.document_id.to_string(),
                p.pass_type.to_string(),
                format!("{:.4}", p.score),
            ),
            None => Default::default(),
        };
        writer.write_record(&[
            event.sequence.to_string(),
            proposal_id,
            event.voucher_id.to_string(),
            document_id,
            pass_type,
            score,
            event.decision.to_string(),
            event.actor.clone(),
            event.timestamp.to_rfc3339(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// 审计事件 CSV 文本
pub fn audit_csv_string(
    events: &[AuditEvent],
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let mut buffer = Vec::new();
    write_audit_csv(events, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// 导出审计事件到 CSV 文件
pub fn export_to_csv(
    events: &[AuditEvent],
    output_path: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let file = std::fs::File::create(output_path)?;
    write_audit_csv(events, file)
}
