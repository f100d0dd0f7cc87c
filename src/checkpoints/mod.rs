pub mod ledger;
pub mod record;

pub use ledger::{completed_items, latest_outcomes, CheckpointStore, CsvLedger};
pub use record::{CheckpointRecord, Metrics, Outcome};
