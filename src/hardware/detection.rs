//! Host capability detection
//!
//! Every sub-query degrades to a conservative default on failure, so
//! [`detect_hardware`] always returns a usable snapshot.

use crate::hardware::gpu;
use crate::utils::{format_bytes, MemoryInfo, GIB};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{info, warn};

/// Available RAM below which parallel loading regresses.
pub const RAM_SUFFICIENCY_BYTES: u64 = 6 * GIB;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub available: bool,
    pub name: String,
    pub vram_total_bytes: u64,
    pub vram_free_bytes: u64,
    pub device_count: usize,
}

impl GpuInfo {
    /// CPU-only host
    pub fn unavailable() -> Self {
        Self {
            available: false,
            name: "CPU".to_string(),
            vram_total_bytes: 0,
            vram_free_bytes: 0,
            device_count: 0,
        }
    }

    pub fn vram_total_gb(&self) -> f64 {
        self.vram_total_bytes as f64 / GIB as f64
    }
}

impl Default for GpuInfo {
    fn default() -> Self {
        Self::unavailable()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub physical_cores: usize,
    pub logical_cores: usize,
    pub model: String,
    pub freq_mhz: Option<u64>,
}

impl Default for CpuInfo {
    fn default() -> Self {
        Self {
            physical_cores: 1,
            logical_cores: 1,
            model: "Unknown CPU".to_string(),
            freq_mhz: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl RamInfo {
    /// Enough free RAM for pinned, multi-worker loading
    pub fn is_sufficient(&self) -> bool {
        self.available_bytes >= RAM_SUFFICIENCY_BYTES
    }

    pub fn available_gb(&self) -> f64 {
        self.available_bytes as f64 / GIB as f64
    }
}

/// Point-in-time view of the host, created fresh on each detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub gpu: GpuInfo,
    pub cpu: CpuInfo,
    pub ram: RamInfo,
    pub platform: String,
}

impl Default for HardwareSnapshot {
    fn default() -> Self {
        Self {
            gpu: GpuInfo::default(),
            cpu: CpuInfo::default(),
            ram: RamInfo::default(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

/// Detect accelerator, CPU and RAM characteristics. Never fails.
pub fn detect_hardware() -> HardwareSnapshot {
    let snapshot = HardwareSnapshot {
        gpu: detect_gpu(),
        cpu: detect_cpu(),
        ram: detect_ram(),
        platform: std::env::consts::OS.to_string(),
    };

    info!(
        gpu = %snapshot.gpu.name,
        vram = %format_bytes(snapshot.gpu.vram_total_bytes),
        physical_cores = snapshot.cpu.physical_cores,
        logical_cores = snapshot.cpu.logical_cores,
        ram_total = %format_bytes(snapshot.ram.total_bytes),
        ram_available = %format_bytes(snapshot.ram.available_bytes),
        "Hardware detection complete"
    );

    snapshot
}

fn detect_gpu() -> GpuInfo {
    match gpu::query_devices() {
        Ok(devices) => {
            // Device 0 drives selection; count reflects every visible device
            let primary = &devices[0];
            GpuInfo {
                available: true,
                name: primary.name.clone(),
                vram_total_bytes: primary.total_bytes,
                vram_free_bytes: primary.free_bytes,
                device_count: devices.len(),
            }
        }
        Err(e) => {
            info!("No accelerator detected, using CPU mode: {e:#}");
            GpuInfo::unavailable()
        }
    }
}

fn detect_cpu() -> CpuInfo {
    let sys =
        System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));

    let logical_cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or_else(|_| sys.cpus().len().max(1));

    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").unwrap_or_default();
    let physical_cores = count_physical_cores(&cpuinfo).unwrap_or(logical_cores);

    let brand = sys
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .filter(|b| !b.is_empty());
    let model = brand
        .or_else(|| cpu_model_name(&cpuinfo))
        .unwrap_or_else(|| "Unknown CPU".to_string());

    let freq_mhz = sys
        .cpus()
        .iter()
        .map(|c| c.frequency())
        .max()
        .filter(|&f| f > 0);

    if logical_cores == 0 {
        warn!("CPU detection returned zero cores, using defaults");
        return CpuInfo::default();
    }

    CpuInfo {
        physical_cores: physical_cores.max(1),
        logical_cores,
        model,
        freq_mhz,
    }
}

fn detect_ram() -> RamInfo {
    match MemoryInfo::current() {
        Ok(info) => RamInfo {
            total_bytes: info.system_total_bytes,
            available_bytes: info.system_available_bytes,
        },
        Err(e) => {
            warn!("RAM detection failed: {e}");
            RamInfo::default()
        }
    }
}

/// Count distinct `(physical id, core id)` pairs in `/proc/cpuinfo` text.
pub fn count_physical_cores(cpuinfo: &str) -> Option<usize> {
    let mut cores = HashSet::new();
    let mut physical_id = None;
    let mut core_id = None;

    for line in cpuinfo.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if let (Some(p), Some(c)) = (physical_id.take(), core_id.take()) {
                cores.insert((p, c));
            }
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "physical id" => physical_id = value.trim().parse::<u32>().ok(),
            "core id" => core_id = value.trim().parse::<u32>().ok(),
            _ => {}
        }
    }

    (!cores.is_empty()).then_some(cores.len())
}

fn cpu_model_name(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim().to_string())
}
