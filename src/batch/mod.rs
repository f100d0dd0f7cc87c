pub mod engine;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod scan;

pub use engine::{parse_metrics_line, CommandEngine, InferenceEngine, WorkItem};
pub use orchestrator::{BatchOrchestrator, RunOptions};
pub use progress::{format_duration, ProgressCallback, ProgressTracker};
pub use report::{write_results_csv, RunSummary};
pub use scan::scan_items;
