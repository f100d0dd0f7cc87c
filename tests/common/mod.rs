//! Fakes shared by the integration tests

#![allow(dead_code)]

use cac_batch::batch::{InferenceEngine, WorkItem};
use cac_batch::checkpoints::{CheckpointRecord, CheckpointStore, Metrics};
use cac_batch::config::SafetyThresholds;
use cac_batch::error::InferenceError;
use cac_batch::hardware::ExecutionProfile;
use cac_batch::safety::{RamReading, ResourceProbe, SafetyMonitor, VramReading};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn metrics(score: f64) -> Metrics {
    Metrics {
        agatston_score: score,
        calcium_volume_mm3: score * 0.9,
        calcium_mass_mg: score * 0.15,
        num_slices: 64,
        has_calcification: score > 0.0,
        patient_age: Some(55),
        patient_sex: Some("F".to_string()),
        is_premature_cad: Some(false),
    }
}

pub fn items(n: usize) -> Vec<WorkItem> {
    (1..=n)
        .map(|i| WorkItem::new(format!("patient_{i:03}"), format!("/data/patient_{i:03}")))
        .collect()
}

/// Engine that fails for a fixed set of item ids and records every call
#[derive(Default)]
pub struct ScriptedEngine {
    pub failing: HashSet<String>,
    pub calls: Vec<String>,
}

impl ScriptedEngine {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            calls: Vec::new(),
        }
    }
}

impl InferenceEngine for ScriptedEngine {
    fn score(
        &mut self,
        item: &WorkItem,
        _profile: &ExecutionProfile,
        _monitor: &SafetyMonitor,
    ) -> Result<Metrics, InferenceError> {
        self.calls.push(item.id.clone());
        if self.failing.contains(&item.id) {
            return Err(InferenceError::Item(format!("no usable series in {}", item.id)));
        }
        Ok(metrics(self.calls.len() as f64 * 10.0))
    }
}

/// Probe whose RAM availability can be changed between items
#[derive(Clone)]
pub struct AdjustableProbe {
    pub ram_available_percent: Arc<AtomicU64>,
    pub releases: Arc<AtomicUsize>,
}

impl AdjustableProbe {
    pub fn new(ram_available_percent: u64) -> Self {
        Self {
            ram_available_percent: Arc::new(AtomicU64::new(ram_available_percent)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ResourceProbe for AdjustableProbe {
    fn ram(&self) -> Option<RamReading> {
        Some(RamReading {
            total_bytes: 1000,
            available_bytes: self.ram_available_percent.load(Ordering::SeqCst) * 10,
        })
    }

    fn vram(&self) -> Option<VramReading> {
        Some(VramReading {
            total_bytes: 1000,
            used_bytes: 200,
        })
    }

    fn release_cached_memory(&self) -> anyhow::Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn monitor_with(probe: &AdjustableProbe) -> SafetyMonitor {
    SafetyMonitor::with_probe(SafetyThresholds::default(), probe.clone())
}

/// Store whose writes always fail, as on a full disk
pub struct BrokenStore;

impl CheckpointStore for BrokenStore {
    fn load(&self) -> HashSet<String> {
        HashSet::new()
    }

    fn append(&self, _record: &CheckpointRecord) -> anyhow::Result<()> {
        anyhow::bail!("No space left on device")
    }

    fn clear(&self) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn records(&self) -> anyhow::Result<Vec<CheckpointRecord>> {
        Ok(Vec::new())
    }
}
