pub mod export;
pub mod records;

pub use export::{audit_csv_string, export_to_csv, write_audit_csv};
pub use records::{RecordStore, StoreCounts, StoreSnapshot};
