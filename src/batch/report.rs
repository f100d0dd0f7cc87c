//! End-of-run summary and results export

use crate::checkpoints::ledger::write_records;
use crate::checkpoints::CheckpointRecord;
use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Score statistics over the successful records of a result set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub mean_score: Option<f64>,
    pub median_score: Option<f64>,
    pub max_score: Option<f64>,
}

impl RunSummary {
    pub fn from_records(records: &[CheckpointRecord]) -> Self {
        let mut scores: Vec<f64> = records
            .iter()
            .filter_map(|r| r.metrics().map(|m| m.agatston_score))
            .collect();
        scores.sort_by(|a, b| a.total_cmp(b));

        let succeeded = scores.len();
        let mean_score = (succeeded > 0).then(|| scores.iter().sum::<f64>() / succeeded as f64);
        let median_score = match succeeded {
            0 => None,
            n if n % 2 == 1 => Some(scores[n / 2]),
            n => Some((scores[n / 2 - 1] + scores[n / 2]) / 2.0),
        };

        Self {
            total: records.len(),
            succeeded,
            failed: records.len() - succeeded,
            mean_score,
            median_score,
            max_score: scores.last().copied(),
        }
    }

    pub fn log(&self) {
        info!(
            total = self.total,
            succeeded = self.succeeded,
            failed = self.failed,
            "Batch finished"
        );
        if let (Some(mean), Some(median), Some(max)) =
            (self.mean_score, self.median_score, self.max_score)
        {
            info!("Agatston score: mean {mean:.1}, median {median:.1}, max {max:.1}");
        }
    }
}

fn write_csv(path: &Path, records: &[CheckpointRecord], write_bom: bool) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    if write_bom {
        file.write_all(b"\xEF\xBB\xBF")?;
    }
    write_records(&mut file, records, true)
        .with_context(|| format!("Failed to write results to {}", path.display()))
}

/// Write `cac_results_<timestamp>.csv` and refresh `cac_results_latest.csv`.
///
/// Returns the timestamped path.
pub fn write_results_csv(
    output_dir: &Path,
    records: &[CheckpointRecord],
    write_bom: bool,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = output_dir.join(format!("cac_results_{stamp}.csv"));
    write_csv(&path, records, write_bom)?;
    write_csv(&output_dir.join("cac_results_latest.csv"), records, write_bom)?;

    info!("Results saved to {} ({} rows)", path.display(), records.len());
    Ok(path)
}
