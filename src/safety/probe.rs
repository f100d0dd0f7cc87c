//! Live resource sensors behind a trait so the monitor can be driven by
//! fakes in tests and by an engine's own allocator in production.

use crate::hardware::gpu;
use crate::utils::MemoryInfo;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamReading {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl RamReading {
    pub fn available_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.available_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VramReading {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl VramReading {
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.total_bytes as f64) * 100.0
    }

    pub fn free_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }
}

/// Source of RAM/VRAM readings
pub trait ResourceProbe: Send + Sync {
    /// Current host memory, `None` when unreadable
    fn ram(&self) -> Option<RamReading>;

    /// Current accelerator memory, `None` when no accelerator is present
    fn vram(&self) -> Option<VramReading>;

    /// Release cached, unused accelerator allocations. Must be idempotent.
    fn release_cached_memory(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Probe backed by the operating system and `nvidia-smi`
#[derive(Debug, Clone)]
pub struct SystemProbe {
    accelerator_present: bool,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            accelerator_present: gpu::query_devices().is_ok(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn ram(&self) -> Option<RamReading> {
        MemoryInfo::current().ok().map(|info| RamReading {
            total_bytes: info.system_total_bytes,
            available_bytes: info.system_available_bytes,
        })
    }

    fn vram(&self) -> Option<VramReading> {
        if !self.accelerator_present {
            return None;
        }
        let devices = gpu::query_devices().ok()?;
        let primary = devices.first()?;
        Some(VramReading {
            total_bytes: primary.total_bytes,
            used_bytes: primary.used_bytes,
        })
    }

    fn release_cached_memory(&self) -> anyhow::Result<()> {
        // Cached allocations belong to the scoring process, which frees them on exit
        debug!("No in-process accelerator allocator to release");
        Ok(())
    }
}
