use serde::{Deserialize, Serialize};

/// Results export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Prefix CSV files with a UTF-8 BOM so spreadsheet tools detect the encoding
    pub write_bom: bool,
    /// Write `cac_results_<timestamp>.csv` after a run
    pub save_results: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_bom: true,
            save_results: true,
        }
    }
}
