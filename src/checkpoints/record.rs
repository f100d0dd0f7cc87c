//! Per-item outcome records

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Scores returned by the inference engine for one study
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub agatston_score: f64,
    pub calcium_volume_mm3: f64,
    pub calcium_mass_mg: f64,
    /// Slices actually scored
    pub num_slices: u32,
    pub has_calcification: bool,
    #[serde(default)]
    pub patient_age: Option<u32>,
    #[serde(default)]
    pub patient_sex: Option<String>,
    #[serde(default)]
    pub is_premature_cad: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success(Metrics),
    Failed(String),
}

impl Outcome {
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// One ledger row. The ledger may hold several per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub item_id: String,
    pub outcome: Outcome,
    pub timestamp: DateTime<Local>,
}

impl CheckpointRecord {
    pub fn success(item_id: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            item_id: item_id.into(),
            outcome: Outcome::Success(metrics),
            timestamp: Local::now(),
        }
    }

    pub fn failed(item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            outcome: Outcome::Failed(reason.into()),
            timestamp: Local::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.outcome {
            Outcome::Success(m) => Some(m),
            Outcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failed(reason) => Some(reason),
        }
    }
}
