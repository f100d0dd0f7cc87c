//! Inference engine boundary
//!
//! The orchestrator only sees two outcomes per item: metrics or an
//! [`InferenceError`]. How scoring happens is the engine's business.

use crate::checkpoints::Metrics;
use crate::error::InferenceError;
use crate::hardware::ExecutionProfile;
use crate::safety::{propose_downgrade, SafetyMonitor};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// One study to score
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    /// Stable identity used as the ledger key
    pub id: String,
    pub path: PathBuf,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Identity taken from the final path component
    pub fn from_path(path: &Path) -> Self {
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(id, path)
    }
}

pub trait InferenceEngine {
    /// Score one item synchronously
    fn score(
        &mut self,
        item: &WorkItem,
        profile: &ExecutionProfile,
        monitor: &SafetyMonitor,
    ) -> Result<Metrics, InferenceError>;
}

/// Runs an external scorer once per item.
///
/// The command is invoked as `program args... <item_path>` with the loader
/// settings in `CAC_*` environment variables. Its last non-empty stdout line
/// must be a JSON metrics object.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Loader settings for this call. Pressure seen right before launch
    /// narrows the loader without touching the run's profile.
    fn launch_profile(profile: &ExecutionProfile, monitor: &SafetyMonitor) -> ExecutionProfile {
        let status = monitor.check_status();
        if monitor.should_downgrade(&status) {
            let proposal = propose_downgrade(&status, profile.worker_count);
            debug!("Scorer launched with reduced loader: {proposal:?}");
            profile.apply_downgrade(&proposal)
        } else {
            profile.clone()
        }
    }
}

/// Parse the scorer's final non-empty stdout line
pub fn parse_metrics_line(stdout: &str) -> Result<Metrics, InferenceError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| InferenceError::InvalidOutput("scorer printed nothing".to_string()))?;

    serde_json::from_str(line).map_err(|e| InferenceError::InvalidOutput(format!("{e}: '{line}'")))
}

impl InferenceEngine for CommandEngine {
    fn score(
        &mut self,
        item: &WorkItem,
        profile: &ExecutionProfile,
        monitor: &SafetyMonitor,
    ) -> Result<Metrics, InferenceError> {
        if !item.path.exists() {
            return Err(InferenceError::Item(format!(
                "item path does not exist: {}",
                item.path.display()
            )));
        }

        let launch = Self::launch_profile(profile, monitor);
        let prefetch = launch
            .prefetch_depth
            .map_or_else(String::new, |d| d.to_string());

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&item.path)
            .env("CAC_WORKERS", launch.worker_count.to_string())
            .env("CAC_PIN_MEMORY", if launch.pin_memory { "1" } else { "0" })
            .env("CAC_PREFETCH", prefetch)
            .env(
                "CAC_BATCH_GRANULARITY",
                launch.item_batch_granularity.to_string(),
            )
            .output()
            .map_err(InferenceError::Launch)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let stderr = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
            warn!("Scorer failed for {}: {}", item.id, output.status);
            return Err(InferenceError::ScorerFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        parse_metrics_line(&String::from_utf8_lossy(&output.stdout))
    }
}
