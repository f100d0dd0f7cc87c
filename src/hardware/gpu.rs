//! Accelerator memory queries through `nvidia-smi`
//!
//! The driver CLI is used instead of linking CUDA at build time, so the
//! binary runs unchanged on CPU-only workstations.

use anyhow::{bail, Context, Result};
use std::process::Command;

const MIB: u64 = 1024 * 1024;

/// One accelerator as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMemory {
    pub index: u32,
    pub name: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl DeviceMemory {
    /// Percentage of device memory in use
    pub fn used_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

/// Query every visible NVIDIA device.
///
/// Fails when the driver tool is missing, exits non-zero, or reports no devices.
pub fn query_devices() -> Result<Vec<DeviceMemory>> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=index,name,memory.total,memory.used,memory.free",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .context("failed to execute nvidia-smi")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            bail!("nvidia-smi returned non-zero exit status ({})", output.status);
        }
        bail!("nvidia-smi query failed: {stderr}");
    }

    let stdout = String::from_utf8(output.stdout).context("nvidia-smi output was not UTF-8")?;
    let devices = parse_query_output(&stdout)?;
    if devices.is_empty() {
        bail!("nvidia-smi reported no devices");
    }

    Ok(devices)
}

/// Parse `index, name, total, used, free` rows (MiB, no header).
///
/// Device names may themselves contain commas, so the name is everything
/// between the first column and the last three.
pub fn parse_query_output(raw: &str) -> Result<Vec<DeviceMemory>> {
    let mut devices = Vec::new();

    for (line_idx, raw_line) in raw.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        if columns.len() < 5 {
            bail!(
                "unexpected nvidia-smi output at line {}: '{line}'",
                line_idx + 1
            );
        }

        let index = columns[0]
            .parse::<u32>()
            .with_context(|| format!("invalid device index '{}' at line {}", columns[0], line_idx + 1))?;

        let n = columns.len();
        let name = columns[1..n - 3].join(", ");
        let parse_mib = |value: &str, field: &str| -> Result<u64> {
            value.parse::<u64>().map(|mib| mib * MIB).with_context(|| {
                format!("invalid {field} '{value}' at line {}", line_idx + 1)
            })
        };

        devices.push(DeviceMemory {
            index,
            name,
            total_bytes: parse_mib(columns[n - 3], "memory.total")?,
            used_bytes: parse_mib(columns[n - 2], "memory.used")?,
            free_bytes: parse_mib(columns[n - 1], "memory.free")?,
        });
    }

    Ok(devices)
}
