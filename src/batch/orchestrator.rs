//! Sequential, resumable batch loop
//!
//! Items run strictly one at a time in input order. Every outcome is written
//! to the checkpoint store before the next item starts, so a crash or
//! interrupt loses at most the item in flight.

use crate::batch::engine::{InferenceEngine, WorkItem};
use crate::batch::progress::{ProgressCallback, ProgressTracker};
use crate::checkpoints::{CheckpointRecord, CheckpointStore};
use crate::config::ProcessingConfig;
use crate::error::BatchError;
use crate::hardware::ExecutionProfile;
use crate::safety::{SafetyLevel, SafetyMonitor};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Skip items the store already holds a success for
    pub enable_resume: bool,
    /// Sample resources before every Nth item (0 is treated as 1)
    pub safety_check_interval: usize,
    /// Checked between items; set to stop the run
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            enable_resume: true,
            safety_check_interval: 10,
            cancel: None,
        }
    }
}

impl RunOptions {
    pub fn from_config(processing: &ProcessingConfig) -> Self {
        Self {
            enable_resume: processing.enable_resume,
            safety_check_interval: processing.safety_check_interval,
            cancel: None,
        }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

pub struct BatchOrchestrator<'a> {
    profile: ExecutionProfile,
    monitor: SafetyMonitor,
    options: RunOptions,
    on_progress: Option<ProgressCallback<'a>>,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(profile: ExecutionProfile, monitor: SafetyMonitor, options: RunOptions) -> Self {
        Self {
            profile,
            monitor,
            options,
            on_progress: None,
        }
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(usize, usize, &str, &CheckpointRecord) + 'a,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn profile(&self) -> &ExecutionProfile {
        &self.profile
    }

    pub fn monitor(&self) -> &SafetyMonitor {
        &self.monitor
    }

    /// Process every item without a durable success record.
    ///
    /// Returns the outcomes of the items attempted in this call only. Items
    /// skipped through the store are not included.
    pub fn run(
        &mut self,
        items: &[WorkItem],
        engine: &mut dyn InferenceEngine,
        store: &dyn CheckpointStore,
    ) -> Result<Vec<CheckpointRecord>, BatchError> {
        let skip: HashSet<String> = if self.options.enable_resume {
            store.load()
        } else {
            info!("Resume disabled, every item will be processed");
            HashSet::new()
        };

        let remaining: Vec<&WorkItem> = items.iter().filter(|i| !skip.contains(&i.id)).collect();

        info!(
            total = items.len(),
            skipped = items.len() - remaining.len(),
            remaining = remaining.len(),
            tier = %self.profile.tier,
            workers = self.profile.worker_count,
            "Starting batch"
        );

        if remaining.is_empty() {
            info!("All items already processed, nothing to do");
            return Ok(Vec::new());
        }

        let check_every = self.options.safety_check_interval.max(1);
        let clear_every = self.profile.effective_cache_clear_interval();
        let mut tracker = ProgressTracker::new(remaining.len());
        let mut results = Vec::with_capacity(remaining.len());

        for (position, item) in remaining.into_iter().enumerate() {
            if self.options.cancelled() {
                warn!(
                    "Interrupted after {} of {} items",
                    tracker.processed(),
                    tracker.total()
                );
                return Err(BatchError::Interrupted { completed: results });
            }

            if position % check_every == 0 {
                let status = self.monitor.check_status();
                match status.overall_level {
                    SafetyLevel::Emergency => {
                        self.monitor.log_status(&status);
                        error!("Resource emergency before {}, aborting batch", item.id);
                        return Err(BatchError::ResourceEmergency {
                            item_id: item.id.clone(),
                            status: Box::new(status),
                            completed: results,
                        });
                    }
                    SafetyLevel::Critical => {
                        self.monitor.log_status(&status);
                        self.monitor.clear_accelerator_cache();
                    }
                    SafetyLevel::Warning => self.monitor.log_status(&status),
                    SafetyLevel::Safe => debug!("Resources OK before {}", item.id),
                }
            }

            let started = Instant::now();
            let record = match engine.score(item, &self.profile, &self.monitor) {
                Ok(metrics) => CheckpointRecord::success(&item.id, metrics),
                // Ctrl-C also reaches the scorer; its failure is not recorded
                Err(e) if self.options.cancelled() => {
                    warn!("Interrupted while scoring {}: {e}", item.id);
                    return Err(BatchError::Interrupted { completed: results });
                }
                Err(e) => {
                    warn!("Item {} failed: {e}", item.id);
                    CheckpointRecord::failed(&item.id, e.to_string())
                }
            };

            if let Err(e) = store.append(&record) {
                warn!(
                    "Could not checkpoint {}: {e:#}. Outcome kept in memory only",
                    item.id
                );
            }

            tracker.record(started.elapsed(), record.is_success());
            if let Some(callback) = self.on_progress.as_mut() {
                callback(tracker.processed(), tracker.total(), &item.id, &record);
            }
            debug!("{} {}", item.id, tracker.summary_line());
            results.push(record);

            if tracker.processed() % clear_every == 0 {
                self.monitor.clear_accelerator_cache();
            }
        }

        info!(
            succeeded = tracker.succeeded(),
            failed = tracker.failed(),
            "Batch loop complete"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoints::{completed_items, Metrics};
    use crate::config::SafetyThresholds;
    use crate::error::InferenceError;
    use crate::hardware::Tier;
    use crate::safety::{RamReading, ResourceProbe, VramReading};
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicU64, AtomicUsize};

    #[derive(Clone, Default)]
    struct Sensors {
        ram_available_percent: Arc<AtomicU64>,
        checks: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    struct SharedProbe(Sensors);

    impl ResourceProbe for SharedProbe {
        fn ram(&self) -> Option<RamReading> {
            self.0.checks.fetch_add(1, Ordering::SeqCst);
            Some(RamReading {
                total_bytes: 100,
                available_bytes: self.0.ram_available_percent.load(Ordering::SeqCst),
            })
        }

        fn vram(&self) -> Option<VramReading> {
            Some(VramReading {
                total_bytes: 100,
                used_bytes: 10,
            })
        }

        fn release_cached_memory(&self) -> anyhow::Result<()> {
            self.0.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn monitor(ram_percent: u64) -> (SafetyMonitor, Sensors) {
        let sensors = Sensors::default();
        sensors
            .ram_available_percent
            .store(ram_percent, Ordering::SeqCst);
        let m = SafetyMonitor::with_probe(SafetyThresholds::default(), SharedProbe(sensors.clone()));
        (m, sensors)
    }

    #[derive(Default)]
    struct CountingEngine {
        calls: Vec<String>,
    }

    impl InferenceEngine for CountingEngine {
        fn score(
            &mut self,
            item: &WorkItem,
            _profile: &ExecutionProfile,
            _monitor: &SafetyMonitor,
        ) -> Result<Metrics, InferenceError> {
            self.calls.push(item.id.clone());
            if item.id.ends_with("bad") {
                return Err(InferenceError::Item("unreadable series".to_string()));
            }
            Ok(metrics())
        }
    }

    fn metrics() -> Metrics {
        Metrics {
            agatston_score: 1.0,
            calcium_volume_mm3: 1.0,
            calcium_mass_mg: 1.0,
            num_slices: 1,
            has_calcification: true,
            patient_age: None,
            patient_sex: None,
            is_premature_cad: None,
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: RefCell<Vec<CheckpointRecord>>,
    }

    impl CheckpointStore for MemoryStore {
        fn load(&self) -> HashSet<String> {
            completed_items(&self.rows.borrow())
        }

        fn append(&self, record: &CheckpointRecord) -> anyhow::Result<()> {
            self.rows.borrow_mut().push(record.clone());
            Ok(())
        }

        fn clear(&self) -> anyhow::Result<bool> {
            let had_rows = !self.rows.borrow().is_empty();
            self.rows.borrow_mut().clear();
            Ok(had_rows)
        }

        fn records(&self) -> anyhow::Result<Vec<CheckpointRecord>> {
            Ok(self.rows.borrow().clone())
        }
    }

    fn items(ids: &[&str]) -> Vec<WorkItem> {
        ids.iter().map(|id| WorkItem::new(*id, format!("/data/{id}"))).collect()
    }

    #[test]
    fn test_failures_are_isolated_and_recorded() {
        let (m, _) = monitor(50);
        let mut orchestrator = BatchOrchestrator::new(Tier::Minimal.profile(), m, RunOptions::default());
        let mut engine = CountingEngine::default();
        let store = MemoryStore::default();

        let results = orchestrator
            .run(&items(&["a", "b_bad", "c"]), &mut engine, &store)
            .unwrap();

        assert_eq!(engine.calls, ["a", "b_bad", "c"]);
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 2);
        assert_eq!(store.rows.borrow().len(), 3);
        assert_eq!(results[1].error(), Some("unreadable series"));
    }

    #[test]
    fn test_safety_checks_on_interval_boundaries() {
        let (m, sensors) = monitor(50);
        let options = RunOptions {
            safety_check_interval: 2,
            ..Default::default()
        };
        let mut orchestrator = BatchOrchestrator::new(Tier::Minimal.profile(), m, options);
        orchestrator
            .run(
                &items(&["a", "b", "c", "d", "e"]),
                &mut CountingEngine::default(),
                &MemoryStore::default(),
            )
            .unwrap();

        // Positions 0, 2 and 4
        assert_eq!(sensors.checks.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_critical_clears_cache_and_continues() {
        let (m, sensors) = monitor(8);
        let mut profile = Tier::Enterprise.profile();
        profile.cache_clear_interval = 100;
        let options = RunOptions {
            safety_check_interval: 1,
            ..Default::default()
        };
        let mut orchestrator = BatchOrchestrator::new(profile, m, options);
        let mut engine = CountingEngine::default();
        let results = orchestrator
            .run(&items(&["a", "b"]), &mut engine, &MemoryStore::default())
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(sensors.releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_housekeeping_cache_clear_cadence() {
        let (m, sensors) = monitor(50);
        let mut profile = Tier::Performance.profile();
        profile.cache_clear_interval = 3;
        let mut orchestrator = BatchOrchestrator::new(profile, m, RunOptions::default());
        orchestrator
            .run(
                &items(&["a", "b", "c", "d", "e", "f", "g"]),
                &mut CountingEngine::default(),
                &MemoryStore::default(),
            )
            .unwrap();

        // After items 3 and 6
        assert_eq!(sensors.releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_between_items() {
        let (m, _) = monitor(50);
        let flag = Arc::new(AtomicBool::new(false));
        let options = RunOptions::default().with_cancel_flag(Arc::clone(&flag));
        let mut orchestrator = BatchOrchestrator::new(Tier::Minimal.profile(), m, options)
            .with_progress(|processed, _, _, _| {
                if processed == 2 {
                    flag.store(true, Ordering::SeqCst);
                }
            });
        let mut engine = CountingEngine::default();
        let store = MemoryStore::default();

        let err = orchestrator
            .run(&items(&["a", "b", "c", "d"]), &mut engine, &store)
            .unwrap_err();

        assert!(matches!(err, BatchError::Interrupted { .. }));
        assert_eq!(err.completed().len(), 2);
        assert_eq!(engine.calls, ["a", "b"]);
        assert_eq!(store.rows.borrow().len(), 2);
    }

    struct SignalledEngine {
        flag: Arc<AtomicBool>,
        calls: usize,
    }

    impl InferenceEngine for SignalledEngine {
        fn score(
            &mut self,
            _item: &WorkItem,
            _profile: &ExecutionProfile,
            _monitor: &SafetyMonitor,
        ) -> Result<Metrics, InferenceError> {
            self.calls += 1;
            if self.calls < 2 {
                return Ok(metrics());
            }
            self.flag.store(true, Ordering::SeqCst);
            Err(InferenceError::ScorerFailed {
                status: "signal: 2 (SIGINT)".to_string(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_cancel_during_item_leaves_it_unrecorded() {
        let (m, _) = monitor(50);
        let flag = Arc::new(AtomicBool::new(false));
        let options = RunOptions::default().with_cancel_flag(Arc::clone(&flag));
        let mut orchestrator = BatchOrchestrator::new(Tier::Minimal.profile(), m, options);
        let mut engine = SignalledEngine { flag, calls: 0 };
        let store = MemoryStore::default();

        let err = orchestrator
            .run(&items(&["a", "b", "c"]), &mut engine, &store)
            .unwrap_err();

        assert!(matches!(err, BatchError::Interrupted { .. }));
        assert_eq!(engine.calls, 2);
        let ids: Vec<_> = err.completed().iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, ["a"]);
        let rows = store.rows.borrow();
        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|r| r.item_id != "b"));
    }

    #[test]
    fn test_resume_disabled_reprocesses_but_still_logs() {
        let (m, _) = monitor(50);
        let store = MemoryStore::default();
        store
            .rows
            .borrow_mut()
            .push(CheckpointRecord::success("a", metrics()));

        let options = RunOptions {
            enable_resume: false,
            ..Default::default()
        };
        let mut orchestrator = BatchOrchestrator::new(Tier::Minimal.profile(), m, options);
        let mut engine = CountingEngine::default();
        orchestrator
            .run(&items(&["a", "b"]), &mut engine, &store)
            .unwrap();

        assert_eq!(engine.calls, ["a", "b"]);
        assert_eq!(store.rows.borrow().len(), 3);
    }

    #[test]
    fn test_progress_callback_sees_every_item() {
        let (m, _) = monitor(50);
        let seen = RefCell::new(Vec::new());
        let mut orchestrator = BatchOrchestrator::new(Tier::Minimal.profile(), m, RunOptions::default())
            .with_progress(|processed, total, id, record| {
                seen.borrow_mut()
                    .push((processed, total, id.to_string(), record.is_success()));
            });
        orchestrator
            .run(
                &items(&["x", "y_bad"]),
                &mut CountingEngine::default(),
                &MemoryStore::default(),
            )
            .unwrap();
        drop(orchestrator);

        assert_eq!(
            seen.into_inner(),
            vec![
                (1, 2, "x".to_string(), true),
                (2, 2, "y_bad".to_string(), false)
            ]
        );
    }
}
