//! RAM/VRAM pressure classification and mitigation hints
//!
//! The monitor holds only its thresholds and a sensor; every
//! [`SafetyMonitor::check_status`] call takes a fresh reading.

use crate::config::SafetyThresholds;
use crate::safety::probe::{RamReading, ResourceProbe, SystemProbe, VramReading};
use crate::utils::GIB;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Severity of resource pressure, least severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Safe,
    Warning,
    Critical,
    Emergency,
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::Warning => "warning",
            SafetyLevel::Critical => "critical",
            SafetyLevel::Emergency => "emergency",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecommendedAction {
    Continue,
    Monitor,
    Downgrade,
    Stop,
}

impl From<SafetyLevel> for RecommendedAction {
    fn from(level: SafetyLevel) -> Self {
        match level {
            SafetyLevel::Safe => RecommendedAction::Continue,
            SafetyLevel::Warning => RecommendedAction::Monitor,
            SafetyLevel::Critical => RecommendedAction::Downgrade,
            SafetyLevel::Emergency => RecommendedAction::Stop,
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecommendedAction::Continue => "CONTINUE",
            RecommendedAction::Monitor => "MONITOR",
            RecommendedAction::Downgrade => "DOWNGRADE",
            RecommendedAction::Stop => "STOP",
        })
    }
}

/// One poll of resource pressure. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub ram_total_bytes: u64,
    pub ram_available_bytes: u64,
    pub ram_available_percent: f64,
    pub ram_level: SafetyLevel,

    pub vram_total_bytes: u64,
    pub vram_used_bytes: u64,
    pub vram_used_percent: f64,
    pub vram_level: SafetyLevel,

    pub overall_level: SafetyLevel,
    pub recommended_action: RecommendedAction,
    pub detail: String,
}

impl ResourceStatus {
    /// Build a status from raw readings. `None` readings classify as safe.
    pub fn from_readings(
        thresholds: &SafetyThresholds,
        ram: Option<RamReading>,
        vram: Option<VramReading>,
    ) -> Self {
        let ram_level = ram
            .map(|r| classify_ram(r.available_percent(), thresholds))
            .unwrap_or(SafetyLevel::Safe);
        let vram_level = vram
            .map(|v| classify_vram(v.used_percent(), thresholds))
            .unwrap_or(SafetyLevel::Safe);

        let overall_level = ram_level.max(vram_level);
        let recommended_action = RecommendedAction::from(overall_level);

        let ram_avail_gb = ram.map_or(0.0, |r| r.available_bytes as f64 / GIB as f64);
        let vram_free_gb = vram.map_or(0.0, |v| v.free_bytes() as f64 / GIB as f64);
        let detail = describe(ram_level, vram_level, ram_avail_gb, vram_free_gb);

        Self {
            ram_total_bytes: ram.map_or(0, |r| r.total_bytes),
            ram_available_bytes: ram.map_or(0, |r| r.available_bytes),
            ram_available_percent: ram.map_or(100.0, |r| r.available_percent()),
            ram_level,
            vram_total_bytes: vram.map_or(0, |v| v.total_bytes),
            vram_used_bytes: vram.map_or(0, |v| v.used_bytes),
            vram_used_percent: vram.map_or(0.0, |v| v.used_percent()),
            vram_level,
            overall_level,
            recommended_action,
            detail,
        }
    }

    pub fn ram_available_gb(&self) -> f64 {
        self.ram_available_bytes as f64 / GIB as f64
    }

    pub fn vram_free_gb(&self) -> f64 {
        self.vram_total_bytes.saturating_sub(self.vram_used_bytes) as f64 / GIB as f64
    }
}

fn describe(ram: SafetyLevel, vram: SafetyLevel, ram_avail_gb: f64, vram_free_gb: f64) -> String {
    match ram.max(vram) {
        SafetyLevel::Emergency => format!(
            "Resources exhausted (RAM: {ram_avail_gb:.1}GB, VRAM: {vram_free_gb:.1}GB), stop immediately"
        ),
        SafetyLevel::Critical => {
            let mut parts = Vec::new();
            if ram == SafetyLevel::Critical {
                parts.push(format!("RAM low ({ram_avail_gb:.1}GB)"));
            }
            if vram == SafetyLevel::Critical {
                parts.push(format!("VRAM low ({vram_free_gb:.1}GB)"));
            }
            format!("{}, downgrade recommended", parts.join(", "))
        }
        SafetyLevel::Warning => format!(
            "Resources near threshold (RAM: {ram_avail_gb:.1}GB, VRAM: {vram_free_gb:.1}GB), monitoring"
        ),
        SafetyLevel::Safe => format!(
            "Resources sufficient (RAM: {ram_avail_gb:.1}GB, VRAM: {vram_free_gb:.1}GB)"
        ),
    }
}

/// Classify RAM by the percentage still available
pub fn classify_ram(available_percent: f64, thresholds: &SafetyThresholds) -> SafetyLevel {
    if available_percent < thresholds.ram_emergency_percent {
        SafetyLevel::Emergency
    } else if available_percent < thresholds.ram_critical_percent {
        SafetyLevel::Critical
    } else if available_percent < thresholds.ram_warning_percent {
        SafetyLevel::Warning
    } else {
        SafetyLevel::Safe
    }
}

/// Classify VRAM by the percentage in use
pub fn classify_vram(used_percent: f64, thresholds: &SafetyThresholds) -> SafetyLevel {
    if used_percent > thresholds.vram_emergency_percent {
        SafetyLevel::Emergency
    } else if used_percent > thresholds.vram_critical_percent {
        SafetyLevel::Critical
    } else if used_percent > thresholds.vram_warning_percent {
        SafetyLevel::Warning
    } else {
        SafetyLevel::Safe
    }
}

/// Suggested loader settings for the current pressure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DowngradeProposal {
    /// Keep the current configuration
    Keep,
    Reduce {
        worker_count: usize,
        pin_memory: bool,
        reason: String,
    },
}

/// Pure downgrade rule over a status and the current worker count
pub fn propose_downgrade(status: &ResourceStatus, current_workers: usize) -> DowngradeProposal {
    match status.overall_level {
        SafetyLevel::Emergency => DowngradeProposal::Reduce {
            worker_count: 0,
            pin_memory: false,
            reason: "EMERGENCY: resources exhausted, switching to minimal loading".to_string(),
        },
        SafetyLevel::Critical => {
            let workers = current_workers.saturating_sub(1);
            DowngradeProposal::Reduce {
                worker_count: workers,
                pin_memory: workers > 0,
                reason: format!("CRITICAL: reducing workers {current_workers} -> {workers}"),
            }
        }
        SafetyLevel::Warning | SafetyLevel::Safe => DowngradeProposal::Keep,
    }
}

pub struct SafetyMonitor {
    thresholds: SafetyThresholds,
    probe: Box<dyn ResourceProbe>,
    accelerator_present: bool,
}

impl SafetyMonitor {
    /// Monitor backed by the host's own sensors
    pub fn new(thresholds: SafetyThresholds) -> Self {
        Self::with_probe(thresholds, SystemProbe::new())
    }

    pub fn with_probe(thresholds: SafetyThresholds, probe: impl ResourceProbe + 'static) -> Self {
        let accelerator_present = probe.vram().is_some();

        info!(
            "SafetyMonitor initialized: RAM {}%/{}%/{}% available, VRAM {}%/{}%/{}% used, auto-downgrade {}",
            thresholds.ram_warning_percent,
            thresholds.ram_critical_percent,
            thresholds.ram_emergency_percent,
            thresholds.vram_warning_percent,
            thresholds.vram_critical_percent,
            thresholds.vram_emergency_percent,
            thresholds.enable_auto_downgrade,
        );

        Self {
            thresholds,
            probe: Box::new(probe),
            accelerator_present,
        }
    }

    pub fn accelerator_present(&self) -> bool {
        self.accelerator_present
    }

    /// Sample RAM and VRAM and classify them
    pub fn check_status(&self) -> ResourceStatus {
        let vram = if self.accelerator_present {
            self.probe.vram()
        } else {
            None
        };
        ResourceStatus::from_readings(&self.thresholds, self.probe.ram(), vram)
    }

    /// Sample, then propose loader settings for `current_workers`
    pub fn suggest_downgrade(&self, current_workers: usize) -> DowngradeProposal {
        propose_downgrade(&self.check_status(), current_workers)
    }

    /// Whether a status warrants applying a downgrade proposal
    pub fn should_downgrade(&self, status: &ResourceStatus) -> bool {
        self.thresholds.enable_auto_downgrade
            && matches!(
                status.recommended_action,
                RecommendedAction::Downgrade | RecommendedAction::Stop
            )
    }

    /// Release cached accelerator memory. No-op without an accelerator.
    pub fn clear_accelerator_cache(&self) {
        if !self.accelerator_present {
            return;
        }
        match self.probe.release_cached_memory() {
            Ok(()) => debug!("Accelerator cache cleared"),
            Err(e) => warn!("Failed to clear accelerator cache: {e:#}"),
        }
    }

    pub fn log_status(&self, status: &ResourceStatus) {
        let headline = format!(
            "Resource status {}: RAM {:.1}GB available ({:.1}%) [{}], VRAM {:.1}GB free ({:.1}% used) [{}], action {}",
            status.overall_level.to_string().to_uppercase(),
            status.ram_available_gb(),
            status.ram_available_percent,
            status.ram_level,
            status.vram_free_gb(),
            status.vram_used_percent,
            status.vram_level,
            status.recommended_action,
        );
        match status.overall_level {
            SafetyLevel::Safe => info!("{headline}"),
            _ => warn!("{headline} - {}", status.detail),
        }
    }
}
