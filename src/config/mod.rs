pub mod output;
pub mod paths;
pub mod processing;
pub mod safety;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use output::OutputConfig;
pub use paths::{PathConfig, LEDGER_FILE_NAME};
pub use processing::ProcessingConfig;
pub use safety::SafetyThresholds;

/// Main configuration for a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathConfig,
    pub processing: ProcessingConfig,
    pub safety: SafetyThresholds,
    pub output: OutputConfig,
}

impl Config {
    /// Load a YAML config file. Absent sections and keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.safety;
        let in_range = |v: f64| (0.0..=100.0).contains(&v);

        if ![
            s.ram_warning_percent,
            s.ram_critical_percent,
            s.ram_emergency_percent,
            s.vram_warning_percent,
            s.vram_critical_percent,
            s.vram_emergency_percent,
        ]
        .into_iter()
        .all(in_range)
        {
            return Err(ConfigError::InvalidThresholds(
                "percentages must be within 0..=100".to_string(),
            ));
        }

        if !(s.ram_warning_percent > s.ram_critical_percent
            && s.ram_critical_percent > s.ram_emergency_percent)
        {
            return Err(ConfigError::InvalidThresholds(format!(
                "RAM thresholds must decrease: warning {} > critical {} > emergency {}",
                s.ram_warning_percent, s.ram_critical_percent, s.ram_emergency_percent
            )));
        }

        if !(s.vram_warning_percent < s.vram_critical_percent
            && s.vram_critical_percent < s.vram_emergency_percent)
        {
            return Err(ConfigError::InvalidThresholds(format!(
                "VRAM thresholds must increase: warning {} < critical {} < emergency {}",
                s.vram_warning_percent, s.vram_critical_percent, s.vram_emergency_percent
            )));
        }

        if self.processing.safety_check_interval == 0 {
            return Err(ConfigError::InvalidCheckInterval);
        }

        Ok(())
    }
}
