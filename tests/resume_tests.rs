// SPDX-License-Identifier: MIT
// Copyright (c) 2024 Your AI Project
//
// Resume, idempotence and failure-isolation tests against the CSV ledger

mod common;

use cac_batch::batch::{BatchOrchestrator, RunOptions};
use cac_batch::checkpoints::{CheckpointStore, CsvLedger};
use cac_batch::error::BatchError;
use cac_batch::hardware::Tier;
use common::{items, monitor_with, AdjustableProbe, BrokenStore, ScriptedEngine};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

fn orchestrator(probe: &AdjustableProbe) -> BatchOrchestrator<'static> {
    BatchOrchestrator::new(
        Tier::Standard.profile(),
        monitor_with(probe),
        RunOptions::default(),
    )
}

#[test]
fn test_resume_retries_only_the_failed_item() {
    let dir = TempDir::new().unwrap();
    let ledger = CsvLedger::new(dir.path().join(".cac_resume_ledger.csv"));
    let probe = AdjustableProbe::new(60);
    let work = items(10);

    let mut engine = ScriptedEngine::failing(&["patient_004"]);
    let first = orchestrator(&probe).run(&work, &mut engine, &ledger).unwrap();

    assert_eq!(first.len(), 10);
    assert_eq!(first.iter().filter(|r| r.is_success()).count(), 9);
    assert_eq!(first.iter().filter(|r| !r.is_success()).count(), 1);

    // Same ledger, fresh process
    let ledger = CsvLedger::new(dir.path().join(".cac_resume_ledger.csv"));
    let mut engine = ScriptedEngine::failing(&["patient_004"]);
    let second = orchestrator(&probe).run(&work, &mut engine, &ledger).unwrap();

    assert_eq!(engine.calls, ["patient_004"]);
    assert_eq!(second.len(), 1);
    assert!(!second[0].is_success());
}

#[test]
fn test_second_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let ledger = CsvLedger::new(dir.path().join("ledger.csv"));
    let probe = AdjustableProbe::new(60);
    let work = items(5);

    orchestrator(&probe)
        .run(&work, &mut ScriptedEngine::default(), &ledger)
        .unwrap();

    let mut engine = ScriptedEngine::default();
    let results = orchestrator(&probe).run(&work, &mut engine, &ledger).unwrap();
    assert!(results.is_empty());
    assert!(engine.calls.is_empty());
}

#[test]
fn test_every_attempt_is_in_the_ledger() {
    let dir = TempDir::new().unwrap();
    let ledger = CsvLedger::new(dir.path().join("ledger.csv"));
    let probe = AdjustableProbe::new(60);
    let work = items(6);

    let mut engine = ScriptedEngine::failing(&["patient_002", "patient_005"]);
    orchestrator(&probe).run(&work, &mut engine, &ledger).unwrap();

    let records = ledger.records().unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.item_id.as_str()).collect();
    let expected: Vec<_> = work.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, expected);
}

#[test]
fn test_corrupt_ledger_starts_from_scratch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.csv");
    fs::write(&path, "\u{feff}not,a,ledger\n\"unterminated").unwrap();

    let ledger = CsvLedger::new(&path);
    let probe = AdjustableProbe::new(60);
    let mut engine = ScriptedEngine::default();
    let results = orchestrator(&probe)
        .run(&items(3), &mut engine, &ledger)
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(engine.calls.len(), 3);
}

fn tear_tail(path: &Path, fragment: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(fragment).unwrap();
}

#[test]
fn test_unterminated_last_row_keeps_later_successes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.csv");
    let ledger = CsvLedger::new(&path);
    let probe = AdjustableProbe::new(60);
    let work = items(3);

    orchestrator(&probe)
        .run(&work[..1], &mut ScriptedEngine::default(), &ledger)
        .unwrap();
    tear_tail(&path, b"patient_002,succ");

    let mut engine = ScriptedEngine::default();
    orchestrator(&probe).run(&work, &mut engine, &ledger).unwrap();
    assert_eq!(engine.calls, ["patient_002", "patient_003"]);

    let done = ledger.load();
    assert_eq!(done.len(), 3);

    let mut engine = ScriptedEngine::default();
    let results = orchestrator(&probe).run(&work, &mut engine, &ledger).unwrap();
    assert!(results.is_empty());
    assert!(engine.calls.is_empty());
}

#[test]
fn test_open_quote_in_torn_row_does_not_swallow_the_rest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.csv");
    let ledger = CsvLedger::new(&path);
    let probe = AdjustableProbe::new(60);
    let work = items(5);

    orchestrator(&probe)
        .run(&work[..1], &mut ScriptedEngine::default(), &ledger)
        .unwrap();
    tear_tail(&path, b"patient_002,failed,\"bad, ser");

    let mut engine = ScriptedEngine::default();
    orchestrator(&probe).run(&work, &mut engine, &ledger).unwrap();
    assert_eq!(engine.calls.len(), 4);

    let done = ledger.load();
    for item in &work {
        assert!(done.contains(&item.id), "{} missing after reload", item.id);
    }
    let ids: Vec<_> = ledger
        .records()
        .unwrap()
        .into_iter()
        .map(|r| r.item_id)
        .collect();
    assert_eq!(ids, work.iter().map(|i| i.id.clone()).collect::<Vec<_>>());
}

#[test]
fn test_ledger_write_failure_does_not_abort() {
    let probe = AdjustableProbe::new(60);
    let mut engine = ScriptedEngine::default();
    let results = orchestrator(&probe)
        .run(&items(4), &mut engine, &BrokenStore)
        .unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.is_success()));
}

#[test]
fn test_emergency_aborts_before_scoring() {
    let dir = TempDir::new().unwrap();
    let ledger = CsvLedger::new(dir.path().join("ledger.csv"));
    let probe = AdjustableProbe::new(3);
    let mut engine = ScriptedEngine::default();

    let err = orchestrator(&probe)
        .run(&items(3), &mut engine, &ledger)
        .unwrap_err();

    match &err {
        BatchError::ResourceEmergency { item_id, .. } => assert_eq!(item_id, "patient_001"),
        other => panic!("expected emergency, got {other}"),
    }
    assert!(engine.calls.is_empty());
    assert!(ledger.load().is_empty());
}

#[test]
fn test_emergency_mid_batch_keeps_earlier_outcomes() {
    let dir = TempDir::new().unwrap();
    let ledger = CsvLedger::new(dir.path().join("ledger.csv"));
    let probe = AdjustableProbe::new(60);
    let options = RunOptions {
        safety_check_interval: 2,
        ..Default::default()
    };

    let pressure = probe.ram_available_percent.clone();
    let mut orchestrator =
        BatchOrchestrator::new(Tier::Standard.profile(), monitor_with(&probe), options)
            .with_progress(move |processed, _, _, _| {
                if processed == 2 {
                    pressure.store(2, Ordering::SeqCst);
                }
            });
    let mut engine = ScriptedEngine::default();
    let err = orchestrator
        .run(&items(5), &mut engine, &ledger)
        .unwrap_err();

    assert_eq!(engine.calls, ["patient_001", "patient_002"]);
    assert_eq!(err.completed().len(), 2);
    assert!(!ledger.load().contains("patient_003"));
    assert_eq!(ledger.load().len(), 2);
}
