//! Error taxonomy
//!
//! Only [`BatchError`] escapes the batch loop. Inference and ledger failures
//! are converted into outcomes or log lines where they occur.

use crate::checkpoints::CheckpointRecord;
use crate::safety::ResourceStatus;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid safety thresholds: {0}")]
    InvalidThresholds(String),

    #[error("safety_check_interval must be at least 1")]
    InvalidCheckInterval,
}

/// Batch-fatal conditions
#[derive(Error, Debug)]
pub enum BatchError {
    /// Resources exhausted at an item boundary; the item was not attempted
    #[error("resource emergency before item {item_id}: {}", .status.detail)]
    ResourceEmergency {
        item_id: String,
        status: Box<ResourceStatus>,
        completed: Vec<CheckpointRecord>,
    },

    /// Cancellation observed between items
    #[error("batch interrupted after {} items", .completed.len())]
    Interrupted { completed: Vec<CheckpointRecord> },
}

impl BatchError {
    /// Outcomes recorded before the batch stopped
    pub fn completed(&self) -> &[CheckpointRecord] {
        match self {
            BatchError::ResourceEmergency { completed, .. } => completed,
            BatchError::Interrupted { completed } => completed,
        }
    }
}

/// Per-item scoring failure, recorded as a failed outcome
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("failed to launch scorer: {0}")]
    Launch(#[source] std::io::Error),

    #[error("scorer exited with {status}: {stderr}")]
    ScorerFailed { status: String, stderr: String },

    #[error("scorer produced invalid metrics: {0}")]
    InvalidOutput(String),

    #[error("{0}")]
    Item(String),
}
