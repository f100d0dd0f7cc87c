//! Resource-aware batch orchestration for coronary artery calcium scoring
//!
//! Studies are scored one at a time by an external inference engine on
//! whatever hardware is at hand. The crate picks loader settings from the
//! detected hardware, watches RAM/VRAM pressure between items, and keeps a
//! durable ledger of outcomes so an interrupted batch resumes where it left off.
//!
//! ## Main Components
//!
//! - `hardware`: host detection and execution tier selection
//! - `safety`: live resource monitoring and downgrade proposals
//! - `checkpoints`: append-only resume ledger
//! - `batch`: the sequential orchestration loop, item discovery and reporting
//! - `config`: YAML configuration

pub mod batch;
pub mod checkpoints;
pub mod config;
pub mod error;
pub mod hardware;
pub mod safety;
pub mod utils;

pub use batch::{BatchOrchestrator, CommandEngine, InferenceEngine, RunOptions, WorkItem};
pub use checkpoints::{CheckpointRecord, CheckpointStore, CsvLedger, Metrics, Outcome};
pub use config::Config;
pub use error::{BatchError, ConfigError, InferenceError};
pub use hardware::{detect_hardware, select_profile, ExecutionProfile, HardwareSnapshot, Tier};
pub use safety::{SafetyLevel, SafetyMonitor};

/// Library errors
pub use anyhow::{Error, Result};
