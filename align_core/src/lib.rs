//! Per-utterance alignment and transcript file logging.
//!
//! Each finished utterance is saved twice: a timestamped JSON alignment
//! record (per-unit timing) plus the raw transcript text, and latest-copy
//! files (`alignment.json`, `output.txt`) for quick access by tooling.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Timing for one speech unit, in milliseconds from audio start. Absent
/// fields mean the unit arrived without usable timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTiming {
    pub index: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<u64>,
}

/// One utterance's alignment data as persisted to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub timestamp: String,
    pub text: String,
    pub text_length: usize,
    pub total_duration_ms: u64,
    pub unit_count: usize,
    pub units: Vec<UnitTiming>,
}

impl AlignmentRecord {
    /// Build a record from the accumulated units of one utterance. The
    /// total duration is the latest end offset seen; untimed units do not
    /// contribute.
    pub fn new(text: String, units: Vec<UnitTiming>) -> Self {
        let total_duration_ms = units.iter().filter_map(|u| u.end_ms).max().unwrap_or(0);
        Self {
            timestamp: Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string(),
            text_length: text.chars().count(),
            total_duration_ms,
            unit_count: units.len(),
            text,
            units,
        }
    }
}

/// Writes alignment records and transcripts under a base directory.
#[derive(Debug, Clone)]
pub struct AlignmentLogger {
    alignment_dir: PathBuf,
    output_dir: PathBuf,
}

impl AlignmentLogger {
    /// Create the `alignment/` and `outputs/` subdirectories under `base`.
    pub fn new<P: AsRef<Path>>(base: P) -> anyhow::Result<Self> {
        let alignment_dir = base.as_ref().join("alignment");
        let output_dir = base.as_ref().join("outputs");

        fs::create_dir_all(&alignment_dir)
            .with_context(|| format!("Failed to create {}", alignment_dir.display()))?;
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        info!("Alignment logger writing to {}", alignment_dir.display());
        Ok(Self {
            alignment_dir,
            output_dir,
        })
    }

    /// Save one record: timestamped alignment JSON and transcript text,
    /// plus the latest-copy files. Returns the timestamped alignment path.
    pub fn save(&self, record: &AlignmentRecord) -> anyhow::Result<PathBuf> {
        let json = serde_json::to_string_pretty(record)
            .context("Failed to serialize alignment record")?;

        let alignment_file = self
            .alignment_dir
            .join(format!("alignment_{}.json", record.timestamp));
        fs::write(&alignment_file, &json)
            .with_context(|| format!("Failed to write {}", alignment_file.display()))?;

        let latest = self.alignment_dir.join("alignment.json");
        fs::write(&latest, &json)
            .with_context(|| format!("Failed to write {}", latest.display()))?;

        let output_file = self
            .output_dir
            .join(format!("output_{}.txt", record.timestamp));
        fs::write(&output_file, &record.text)
            .with_context(|| format!("Failed to write {}", output_file.display()))?;

        let latest_output = self.output_dir.join("output.txt");
        fs::write(&latest_output, &record.text)
            .with_context(|| format!("Failed to write {}", latest_output.display()))?;

        info!(
            units = record.unit_count,
            duration_ms = record.total_duration_ms,
            "Saved alignment to {}",
            alignment_file.display()
        );
        Ok(alignment_file)
    }

    /// Read back the latest alignment record, if any was saved.
    pub fn latest_alignment(&self) -> anyhow::Result<Option<AlignmentRecord>> {
        let latest = self.alignment_dir.join("alignment.json");
        if !latest.exists() {
            debug!("No alignment saved yet");
            return Ok(None);
        }
        let text = fs::read_to_string(&latest)
            .with_context(|| format!("Failed to read {}", latest.display()))?;
        let record = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a valid alignment record", latest.display()))?;
        Ok(Some(record))
    }

    /// Read back the latest transcript text, if any was saved.
    pub fn latest_transcript(&self) -> anyhow::Result<Option<String>> {
        let latest = self.output_dir.join("output.txt");
        if !latest.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&latest)
            .with_context(|| format!("Failed to read {}", latest.display()))?;
        Ok(Some(text))
    }
}
