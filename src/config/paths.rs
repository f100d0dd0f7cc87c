use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger file name inside the output directory
pub const LEDGER_FILE_NAME: &str = ".cac_resume_ledger.csv";

/// Path configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub data_dir: String,
    pub output_dir: String,
    /// Overrides `<output_dir>/.cac_resume_ledger.csv`
    pub ledger_path: Option<String>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/dicom_original".to_string(),
            output_dir: "./output".to_string(),
            ledger_path: None,
        }
    }
}

impl PathConfig {
    pub fn ledger_file(&self) -> PathBuf {
        match &self.ledger_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.output_dir).join(LEDGER_FILE_NAME),
        }
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}
