// SPDX-License-Identifier: MIT
// Copyright (c) 2024 Your AI Project
//
// Append-only CSV ledger of per-item outcomes. The file is opened and closed
// on every call so it can be copied or inspected while a batch is running.
// Every row occupies exactly one physical line.

use crate::checkpoints::record::{CheckpointRecord, Metrics, Outcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const STATUS_SUCCESS: &str = "success";
const STATUS_FAILED: &str = "failed";

/// Durable store of item outcomes used to resume a batch
pub trait CheckpointStore {
    /// Identities with at least one success row. Unreadable ledgers yield an empty set.
    fn load(&self) -> HashSet<String>;

    /// Durably write one record before returning
    fn append(&self, record: &CheckpointRecord) -> Result<()>;

    /// Delete the ledger. Returns whether anything was removed.
    fn clear(&self) -> Result<bool>;

    /// Every parsed row, in file order
    fn records(&self) -> Result<Vec<CheckpointRecord>>;
}

/// Flat on-disk row
#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    item_id: String,
    status: String,
    #[serde(rename = "error_message", alias = "error")]
    error: Option<String>,
    agatston_score: Option<f64>,
    calcium_volume_mm3: Option<f64>,
    calcium_mass_mg: Option<f64>,
    num_slices: Option<u32>,
    has_calcification: Option<bool>,
    patient_age: Option<u32>,
    patient_sex: Option<String>,
    is_premature_cad: Option<bool>,
    timestamp: String,
}

impl From<&CheckpointRecord> for LedgerRow {
    fn from(record: &CheckpointRecord) -> Self {
        let metrics = record.metrics();
        Self {
            item_id: record.item_id.clone(),
            status: record.outcome.status().to_string(),
            error: record.error().map(single_line),
            agatston_score: metrics.map(|m| m.agatston_score),
            calcium_volume_mm3: metrics.map(|m| m.calcium_volume_mm3),
            calcium_mass_mg: metrics.map(|m| m.calcium_mass_mg),
            num_slices: metrics.map(|m| m.num_slices),
            has_calcification: metrics.map(|m| m.has_calcification),
            patient_age: metrics.and_then(|m| m.patient_age),
            patient_sex: metrics.and_then(|m| m.patient_sex.as_deref().map(single_line)),
            is_premature_cad: metrics.and_then(|m| m.is_premature_cad),
            timestamp: record.timestamp.to_rfc3339(),
        }
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

impl LedgerRow {
    fn into_record(self) -> Option<CheckpointRecord> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()?
            .with_timezone(&Local);

        let outcome = match self.status.as_str() {
            STATUS_SUCCESS => Outcome::Success(Metrics {
                agatston_score: self.agatston_score?,
                calcium_volume_mm3: self.calcium_volume_mm3.unwrap_or(0.0),
                calcium_mass_mg: self.calcium_mass_mg.unwrap_or(0.0),
                num_slices: self.num_slices.unwrap_or(0),
                has_calcification: self
                    .has_calcification
                    .unwrap_or(self.agatston_score? > 0.0),
                patient_age: self.patient_age,
                patient_sex: self.patient_sex,
                is_premature_cad: self.is_premature_cad,
            }),
            STATUS_FAILED => Outcome::Failed(self.error.unwrap_or_default()),
            _ => return None,
        };

        Some(CheckpointRecord {
            item_id: self.item_id,
            outcome,
            timestamp,
        })
    }
}

/// CSV ledger at a fixed path
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
    write_bom: bool,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_bom: true,
        }
    }

    /// Whether a new ledger starts with a UTF-8 BOM
    pub fn with_bom(mut self, write_bom: bool) -> Self {
        self.write_bom = write_bom;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ledger text with any BOM removed, `None` when the file is absent
    fn read_text(&self) -> io::Result<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
                let text = String::from_utf8(body.to_vec())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(text))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Parse the ledger one physical line at a time, so a torn or malformed
    /// row is skipped without swallowing the rows after it. Fails only when
    /// the header is unusable.
    fn parse(text: &str) -> Result<Vec<CheckpointRecord>> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());
        let Some((_, header_line)) = lines.next() else {
            return Ok(Vec::new());
        };

        let headers: StringRecord = parse_line(header_line)
            .context("unreadable ledger header")?
            .iter()
            .map(str::trim)
            .collect();
        let has = |name: &str| headers.iter().any(|h| h == name);
        if !has("item_id") || !has("status") {
            anyhow::bail!("ledger header lacks item_id/status columns");
        }

        let mut records = Vec::new();
        for (idx, line) in lines {
            let row = parse_line(line)
                .and_then(|row| Ok(row.deserialize::<LedgerRow>(Some(&headers))?));
            match row.map(LedgerRow::into_record) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!("Skipping unrecognized ledger line {}", idx + 1),
                Err(e) => warn!("Skipping malformed ledger line {}: {e:#}", idx + 1),
            }
        }
        Ok(records)
    }
}

fn parse_line(line: &str) -> Result<StringRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let record = reader.records().next().context("no CSV record on line")??;
    Ok(record)
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl CheckpointStore for CsvLedger {
    fn load(&self) -> HashSet<String> {
        let text = match self.read_text() {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("No ledger at {}, starting fresh", self.path.display());
                return HashSet::new();
            }
            Err(e) => {
                warn!("Failed to read ledger {}: {e}; starting fresh", self.path.display());
                return HashSet::new();
            }
        };

        if text.trim().is_empty() {
            return HashSet::new();
        }

        match Self::parse(&text) {
            Ok(records) => {
                let done = completed_items(&records);
                info!(
                    "Loaded ledger {}: {} items already completed",
                    self.path.display(),
                    done.len()
                );
                done
            }
            Err(e) => {
                warn!(
                    "Ledger {} is corrupt ({e:#}); treating as no prior progress",
                    self.path.display()
                );
                HashSet::new()
            }
        }
    }

    fn append(&self, record: &CheckpointRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create ledger directory {}", parent.display())
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger {}", self.path.display()))?;

        let len = file.metadata()?.len();
        let is_new = len == 0;
        if is_new && self.write_bom {
            file.write_all(UTF8_BOM)?;
        }
        // A crash mid-write leaves the last row unterminated
        if !ends_with_newline(&mut file, len)? {
            warn!("Ledger {} ends in a torn row; terminating it", self.path.display());
            file.write_all(b"\n")?;
        }

        write_records(&mut file, std::slice::from_ref(record), is_new)
            .with_context(|| format!("Failed to write ledger row for {}", record.item_id))?;
        file.sync_data()
            .with_context(|| format!("Failed to sync ledger {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Cleared ledger {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove ledger {}", self.path.display())),
        }
    }

    fn records(&self) -> Result<Vec<CheckpointRecord>> {
        let Some(text) = self
            .read_text()
            .with_context(|| format!("Failed to read ledger {}", self.path.display()))?
        else {
            return Ok(Vec::new());
        };
        match Self::parse(&text) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("Ledger {} is corrupt ({e:#}); no rows read", self.path.display());
                Ok(Vec::new())
            }
        }
    }
}

/// Write records in the ledger's column layout
pub(crate) fn write_records<W: Write>(
    out: W,
    records: &[CheckpointRecord],
    with_header: bool,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(with_header)
        .from_writer(out);
    for record in records {
        writer.serialize(LedgerRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Items with any success row, regardless of order
pub fn completed_items(records: &[CheckpointRecord]) -> HashSet<String> {
    records
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.item_id.clone())
        .collect()
}

/// One record per item: its latest success if any, otherwise its latest
/// failure. Items keep the order of their first appearance.
pub fn latest_outcomes(records: &[CheckpointRecord]) -> Vec<CheckpointRecord> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut folded: Vec<CheckpointRecord> = Vec::new();

    for record in records {
        match index.get(record.item_id.as_str()) {
            Some(&slot) => {
                if record.is_success() || !folded[slot].is_success() {
                    folded[slot] = record.clone();
                }
            }
            None => {
                index.insert(&record.item_id, folded.len());
                folded.push(record.clone());
            }
        }
    }

    folded
}
