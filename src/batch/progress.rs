//! Progress counters and ETA for a batch run

use crate::checkpoints::CheckpointRecord;
use std::time::Duration;

/// Called after every attempted item with `(processed, total, item_id, record)`
pub type ProgressCallback<'a> = Box<dyn FnMut(usize, usize, &str, &CheckpointRecord) + 'a>;

/// Running counters for the items attempted in one run
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    processed: usize,
    succeeded: usize,
    elapsed: Duration,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            succeeded: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Record one finished item and how long it took
    pub fn record(&mut self, duration: Duration, success: bool) {
        self.processed += 1;
        self.elapsed += duration;
        if success {
            self.succeeded += 1;
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.processed - self.succeeded
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    /// Mean wall time per attempted item
    pub fn average_duration(&self) -> Option<Duration> {
        if self.processed == 0 {
            return None;
        }
        Some(self.elapsed / self.processed as u32)
    }

    pub fn eta(&self) -> Option<Duration> {
        self.average_duration()
            .map(|avg| avg * self.remaining() as u32)
    }

    /// One-line status, e.g. `12/40 (30.0%) | avg 8.2s/item | ETA 3m49s`
    pub fn summary_line(&self) -> String {
        let percent = if self.total == 0 {
            100.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        };
        let avg = self
            .average_duration()
            .map_or_else(|| "-".to_string(), |d| format!("{:.1}s/item", d.as_secs_f64()));
        let eta = self
            .eta()
            .map_or_else(|| "-".to_string(), |d| format_duration(d.as_secs()));
        format!(
            "{}/{} ({percent:.1}%) | avg {avg} | ETA {eta}",
            self.processed, self.total
        )
    }
}

/// Format duration in seconds to human-readable string
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
