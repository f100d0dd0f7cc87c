use serde::{Deserialize, Serialize};

/// Safety monitor thresholds.
///
/// RAM thresholds are percentages of memory still *available*; VRAM
/// thresholds are percentages *used*.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyThresholds {
    pub ram_warning_percent: f64,
    pub ram_critical_percent: f64,
    pub ram_emergency_percent: f64,
    pub vram_warning_percent: f64,
    pub vram_critical_percent: f64,
    pub vram_emergency_percent: f64,
    pub enable_auto_downgrade: bool,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            ram_warning_percent: 20.0,
            ram_critical_percent: 10.0,
            ram_emergency_percent: 5.0,
            vram_warning_percent: 80.0,
            vram_critical_percent: 90.0,
            vram_emergency_percent: 95.0,
            enable_auto_downgrade: true,
        }
    }
}
