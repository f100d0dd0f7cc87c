use std::io;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Bytes in one GiB.
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Host memory reading in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryInfo {
    /// Total system memory
    pub system_total_bytes: u64,
    /// Available system memory (reclaimable pages included)
    pub system_available_bytes: u64,
}

impl MemoryInfo {
    /// Read current system memory
    pub fn current() -> io::Result<Self> {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
        );
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Memory monitoring not supported on this platform",
            ));
        }

        Ok(Self {
            system_total_bytes: total,
            system_available_bytes: sys.available_memory().min(total),
        })
    }

    /// Available memory in GiB
    pub fn available_gb(&self) -> f64 {
        self.system_available_bytes as f64 / GIB as f64
    }

    /// Percentage of system memory still available
    pub fn available_percentage(&self) -> f64 {
        if self.system_total_bytes == 0 {
            return 0.0;
        }
        (self.system_available_bytes as f64 / self.system_total_bytes as f64) * 100.0
    }

    /// Percentage of system memory in use
    pub fn usage_percentage(&self) -> f64 {
        if self.system_total_bytes == 0 {
            return 100.0;
        }
        100.0 - self.available_percentage()
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}
