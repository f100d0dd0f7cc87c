use serde::{Deserialize, Serialize};

/// Batch loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Skip items with a durable success record
    pub enable_resume: bool,
    /// Sample resources before every Nth item
    pub safety_check_interval: usize,
    /// Process at most this many discovered items (pilot mode)
    pub limit: Option<usize>,
    /// Levels below the data dir that are descended into; items sit at most one deeper
    pub scan_depth: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            enable_resume: true,
            safety_check_interval: 10,
            limit: None,
            scan_depth: 2,
        }
    }
}
