//! CLI command implementations

use super::RunArgs;
use anyhow::{Context, Result};
use cac_batch::batch::{
    format_duration, scan_items, write_results_csv, BatchOrchestrator, CommandEngine, RunOptions,
    RunSummary,
};
use cac_batch::checkpoints::{latest_outcomes, CheckpointRecord, CheckpointStore, CsvLedger};
use cac_batch::config::Config;
use cac_batch::error::BatchError;
use cac_batch::hardware::{detect_hardware, select_profile, ExecutionProfile, HardwareSnapshot};
use cac_batch::safety::{propose_downgrade, DowngradeProposal, SafetyMonitor};
use cac_batch::utils::format_bytes;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path)?;
    config.validate()?;
    Ok(config)
}

fn ledger_for(config: &Config) -> CsvLedger {
    CsvLedger::new(config.paths.ledger_file()).with_bom(config.output.write_bom)
}

fn print_snapshot(snapshot: &HardwareSnapshot) {
    let gpu = &snapshot.gpu;
    if gpu.available {
        println!(
            "GPU:       {} ({} total, {} free, {} device{})",
            gpu.name,
            format_bytes(gpu.vram_total_bytes),
            format_bytes(gpu.vram_free_bytes),
            gpu.device_count,
            if gpu.device_count == 1 { "" } else { "s" }
        );
    } else {
        println!("GPU:       not available (CPU mode)");
    }

    let cpu = &snapshot.cpu;
    let freq = cpu
        .freq_mhz
        .map_or_else(String::new, |mhz| format!(" @ {mhz} MHz"));
    println!(
        "CPU:       {} ({} physical / {} logical cores{})",
        cpu.model, cpu.physical_cores, cpu.logical_cores, freq
    );
    println!(
        "RAM:       {} total, {} available{}",
        format_bytes(snapshot.ram.total_bytes),
        format_bytes(snapshot.ram.available_bytes),
        if snapshot.ram.is_sufficient() {
            ""
        } else {
            " (low)"
        }
    );
    println!("Platform:  {}", snapshot.platform);
}

fn print_profile(profile: &ExecutionProfile) {
    println!("Tier:      {} ({})", profile.tier, profile.tier.description());
    println!("Workers:   {}", profile.worker_count);
    println!("Pin mem:   {}", profile.pin_memory);
    println!(
        "Prefetch:  {}",
        profile
            .prefetch_depth
            .map_or_else(|| "-".to_string(), |d| d.to_string())
    );
    println!("Batch:     {} slices", profile.item_batch_granularity);
    println!("Clear/N:   every {} items", profile.cache_clear_interval);
    println!(
        "Expected:  {:.0}-{:.0}s per study ({})",
        profile.expected_time.min_secs_per_item,
        profile.expected_time.max_secs_per_item,
        profile.expected_time.speedup
    );
}

pub fn detect(json: bool) -> Result<()> {
    let snapshot = detect_hardware();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{RULE}");
    println!("Hardware");
    println!("{RULE}");
    print_snapshot(&snapshot);
    println!("{RULE}");
    Ok(())
}

pub fn profile(config_path: &Path, all: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let snapshot = detect_hardware();
    let profile = select_profile(&snapshot);

    println!("{RULE}");
    println!("Execution profile");
    println!("{RULE}");
    print_snapshot(&snapshot);
    println!();
    print_profile(&profile);

    let monitor = SafetyMonitor::new(config.safety);
    let status = monitor.check_status();
    println!();
    println!(
        "Resources: {} ({}), action {}",
        status.overall_level, status.detail, status.recommended_action
    );
    println!("{RULE}");

    if all {
        println!();
        println!("{}", ExecutionProfile::comparison_table());
    }
    Ok(())
}

pub fn status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let ledger = ledger_for(&config);
    let records = ledger.records()?;
    let latest = latest_outcomes(&records);
    let summary = RunSummary::from_records(&latest);

    println!("{RULE}");
    println!("Ledger: {}", ledger.path().display());
    println!("{RULE}");
    if records.is_empty() {
        println!("No checkpoint records.");
        return Ok(());
    }

    println!("Rows:       {}", records.len());
    println!("Studies:    {}", summary.total);
    println!("Succeeded:  {}", summary.succeeded);
    println!("Failed:     {}", summary.failed);
    if let (Some(mean), Some(median), Some(max)) =
        (summary.mean_score, summary.median_score, summary.max_score)
    {
        println!("Agatston:   mean {mean:.1} | median {median:.1} | max {max:.1}");
    }

    let failed: Vec<&CheckpointRecord> = latest.iter().filter(|r| !r.is_success()).collect();
    if !failed.is_empty() {
        println!();
        println!("Failed studies (retried on next run):");
        for record in failed {
            println!(
                "  {:<24} {}",
                record.item_id,
                record.error().unwrap_or_default()
            );
        }
    }
    println!("{RULE}");
    Ok(())
}

pub fn clear_checkpoint(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let ledger = ledger_for(&config);
    if ledger.clear()? {
        println!("Removed {}", ledger.path().display());
    } else {
        println!("No ledger at {}", ledger.path().display());
    }
    Ok(())
}

pub fn run(config_path: &Path, args: RunArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = args.data_dir {
        config.paths.data_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.paths.output_dir = dir;
    }
    if args.limit.is_some() {
        config.processing.limit = args.limit;
    }
    if args.no_resume {
        config.processing.enable_resume = false;
    }
    if let Some(interval) = args.safety_check_interval {
        config.processing.safety_check_interval = interval;
    }
    config.validate()?;

    let ledger = ledger_for(&config);
    if args.clear_checkpoint {
        ledger.clear()?;
    }

    let snapshot = detect_hardware();
    let mut profile = select_profile(&snapshot);
    let monitor = SafetyMonitor::new(config.safety);

    // Single pre-run downgrade pass; the profile is fixed once the loop starts
    let status = monitor.check_status();
    monitor.log_status(&status);
    if monitor.should_downgrade(&status) {
        let proposal = propose_downgrade(&status, profile.worker_count);
        if let DowngradeProposal::Reduce { reason, .. } = &proposal {
            warn!("{reason}");
        }
        profile = profile.apply_downgrade(&proposal);
    }

    println!("{RULE}");
    println!("Calcium scoring batch");
    println!("{RULE}");
    print_snapshot(&snapshot);
    println!();
    print_profile(&profile);
    println!("{RULE}");

    let mut items = scan_items(&config.paths.data_path(), config.processing.scan_depth);
    if let Some(limit) = config.processing.limit {
        if items.len() > limit {
            info!("Pilot mode: limiting to first {limit} of {} studies", items.len());
            items.truncate(limit);
        }
    }
    if items.is_empty() {
        println!("No studies found under {}", config.paths.data_dir);
        return Ok(());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let pb = ProgressBar::new(items.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ETA:{eta} {msg}")?
            .progress_chars("=>-"),
    );

    let options = RunOptions::from_config(&config.processing).with_cancel_flag(cancel);
    let mut engine = CommandEngine::new(&args.scorer).with_args(args.scorer_args);
    let started = Instant::now();

    let outcome = {
        let mut orchestrator = BatchOrchestrator::new(profile, monitor, options).with_progress(
            |processed, total, item_id, record| {
                pb.set_length(total as u64);
                pb.set_position(processed as u64);
                pb.set_message(format!("{item_id} {}", record.outcome.status()));
            },
        );
        orchestrator.run(&items, &mut engine, &ledger)
    };
    pb.finish_and_clear();

    let (results, fatal) = match outcome {
        Ok(results) => (results, None),
        Err(BatchError::Interrupted { completed }) => {
            println!("Interrupted. Re-run the same command to resume.");
            (completed, None)
        }
        Err(err @ BatchError::ResourceEmergency { .. }) => {
            let completed = err.completed().to_vec();
            (completed, Some(err))
        }
    };

    let summary = RunSummary::from_records(&results);
    summary.log();

    println!("{RULE}");
    println!(
        "This run: {} attempted, {} succeeded, {} failed in {}",
        summary.total,
        summary.succeeded,
        summary.failed,
        format_duration(started.elapsed().as_secs())
    );

    if config.output.save_results {
        // Ledger history plus this run, so rows that failed to persist still appear
        let mut history = ledger.records().unwrap_or_else(|e| {
            warn!("Could not read ledger for export: {e:#}");
            Vec::new()
        });
        history.extend(results.iter().cloned());
        let merged = latest_outcomes(&history);
        if !merged.is_empty() {
            let path = write_results_csv(
                &config.paths.output_path(),
                &merged,
                config.output.write_bom,
            )?;
            println!("Results:  {}", path.display());
        }
    }
    println!("{RULE}");

    match fatal {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
