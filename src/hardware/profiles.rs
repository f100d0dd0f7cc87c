//! Execution tiers and their fixed parameter table

use crate::hardware::detection::HardwareSnapshot;
use crate::safety::DowngradeProposal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Ordered execution tier, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// CPU mode or VRAM < 4 GB
    Minimal,
    /// 4-8 GB VRAM (RTX 2060/3050/4050)
    Standard,
    /// 8-13 GB VRAM (RTX 3060/4060)
    Performance,
    /// 13-24 GB VRAM (RTX 4080/A5000)
    Professional,
    /// Multiple devices or >= 24 GB VRAM
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Minimal,
        Tier::Standard,
        Tier::Performance,
        Tier::Professional,
        Tier::Enterprise,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tier::Minimal => "Minimal",
            Tier::Standard => "Standard",
            Tier::Performance => "Performance",
            Tier::Professional => "Professional",
            Tier::Enterprise => "Enterprise",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Tier::Minimal => "CPU mode or GPU VRAM < 4GB",
            Tier::Standard => "4-8GB VRAM (RTX 2060/3050/4050)",
            Tier::Performance => "8-13GB VRAM (RTX 3060/4060)",
            Tier::Professional => "13-24GB VRAM (RTX 4080/A5000)",
            Tier::Enterprise => "Multi-GPU or >= 24GB VRAM (A6000/H100)",
        }
    }

    /// Fixed parameter record for this tier
    pub fn profile(self) -> ExecutionProfile {
        let (worker_count, pin_memory, prefetch_depth, granularity, clear_interval, time) =
            match self {
                Tier::Minimal => (2, false, 2, 8, 1, ExpectedTime::new(8.0, 13.0, "30-40% faster")),
                Tier::Standard => (2, true, 2, 4, 1, ExpectedTime::new(9.0, 13.0, "20-30% faster")),
                Tier::Performance => (4, true, 2, 6, 3, ExpectedTime::new(7.0, 11.0, "35-45% faster")),
                Tier::Professional => (6, true, 3, 8, 5, ExpectedTime::new(5.0, 9.0, "50-60% faster")),
                Tier::Enterprise => (8, true, 4, 12, 10, ExpectedTime::new(3.0, 7.0, "70-80% faster")),
            };

        ExecutionProfile {
            tier: self,
            worker_count,
            pin_memory,
            prefetch_depth: Some(prefetch_depth),
            item_batch_granularity: granularity,
            cache_clear_interval: clear_interval,
            expected_time: time,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expected wall-clock cost of one item under a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedTime {
    pub min_secs_per_item: f64,
    pub max_secs_per_item: f64,
    pub speedup: String,
}

impl ExpectedTime {
    fn new(min: f64, max: f64, speedup: &str) -> Self {
        Self {
            min_secs_per_item: min,
            max_secs_per_item: max,
            speedup: speedup.to_string(),
        }
    }

    /// Unoptimized timing, used once loading optimizations are disabled
    pub fn baseline() -> Self {
        Self::new(12.0, 18.0, "baseline (low RAM, optimizations disabled)")
    }
}

/// Parameters the run is executed with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub tier: Tier,
    /// Data-loading workers inside the inference engine
    pub worker_count: usize,
    pub pin_memory: bool,
    /// Batches prefetched per worker; `None` when loading is synchronous
    pub prefetch_depth: Option<usize>,
    /// Slices scored per forward pass
    pub item_batch_granularity: usize,
    /// Clear accelerator cache every N items
    pub cache_clear_interval: usize,
    pub expected_time: ExpectedTime,
}

impl ExecutionProfile {
    /// Drop two workers and pinned memory when available RAM is short.
    pub fn with_low_ram_adjustment(self) -> Self {
        Self {
            worker_count: self.worker_count.saturating_sub(2),
            pin_memory: false,
            expected_time: ExpectedTime::baseline(),
            ..self
        }
    }

    /// Apply a safety monitor proposal. Only used before a run starts.
    pub fn apply_downgrade(&self, proposal: &DowngradeProposal) -> Self {
        match proposal {
            DowngradeProposal::Keep => self.clone(),
            DowngradeProposal::Reduce {
                worker_count,
                pin_memory,
                ..
            } => Self {
                worker_count: *worker_count,
                pin_memory: *pin_memory,
                prefetch_depth: if *worker_count > 0 {
                    self.prefetch_depth
                } else {
                    None
                },
                ..self.clone()
            },
        }
    }

    /// Housekeeping interval, never zero
    pub fn effective_cache_clear_interval(&self) -> usize {
        self.cache_clear_interval.max(1)
    }

    /// Fixed-width table of every tier's defaults
    pub fn comparison_table() -> String {
        let separator = "=".repeat(75);
        let mut rows = vec![
            separator.clone(),
            format!(
                "{:<13} {:>8} {:>5} {:>9} {:>6} {:>10}  {}",
                "Tier", "Workers", "Pin", "Prefetch", "Batch", "Clear/N", "Time/item"
            ),
            separator.clone(),
        ];

        for tier in Tier::ALL {
            let p = tier.profile();
            rows.push(format!(
                "{:<13} {:>8} {:>5} {:>9} {:>6} {:>10}  {:.0}-{:.0}s",
                tier.name(),
                p.worker_count,
                if p.pin_memory { "yes" } else { "no" },
                p.prefetch_depth.map_or_else(|| "-".to_string(), |d| d.to_string()),
                p.item_batch_granularity,
                p.cache_clear_interval,
                p.expected_time.min_secs_per_item,
                p.expected_time.max_secs_per_item,
            ));
        }

        rows.push(separator);
        rows.join("\n")
    }
}

/// Pick the tier for a snapshot. First matching rule wins.
pub fn select_tier(snapshot: &HardwareSnapshot) -> Tier {
    let gpu = &snapshot.gpu;
    let vram_gb = gpu.vram_total_gb();

    if !gpu.available || vram_gb < 4.0 {
        return Tier::Minimal;
    }

    if gpu.device_count > 1 {
        return Tier::Enterprise;
    }

    if vram_gb >= 24.0 {
        Tier::Enterprise
    } else if vram_gb >= 13.0 {
        Tier::Professional
    } else if vram_gb >= 8.0 {
        Tier::Performance
    } else {
        Tier::Standard
    }
}

/// Select the execution profile for a snapshot, including the one-time
/// low-RAM adjustment.
pub fn select_profile(snapshot: &HardwareSnapshot) -> ExecutionProfile {
    let tier = select_tier(snapshot);
    let mut profile = tier.profile();

    if !snapshot.ram.is_sufficient() {
        warn!(
            "Available RAM is low ({:.1}GB), disabling pin_memory and reducing workers",
            snapshot.ram.available_gb()
        );
        profile = profile.with_low_ram_adjustment();
    }

    info!(
        tier = %profile.tier,
        workers = profile.worker_count,
        pin_memory = profile.pin_memory,
        vram_gb = %format!("{:.1}", snapshot.gpu.vram_total_gb()),
        "Selected performance profile"
    );

    profile
}
