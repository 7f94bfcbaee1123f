use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use anyhow::Result;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Tempo estimated, no adjustment requested.
    Analyzed,
    Rendered { output: PathBuf },
    SkippedUndetectable,
    Failed { error: String },
    /// Batch was cancelled before this file started.
    Cancelled,
}

// One row of the results table; built once by the worker that owned the file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileReport {
    pub file: String,
    pub current_bpm: Option<f64>, // two decimals, None when undetectable
    pub target_bpm: Option<f64>,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub analyzed: usize,
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub version: u32,
    pub folder: PathBuf,
    pub target_bpm: Option<f64>,
    pub files: Vec<FileReport>, // input order
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut s = BatchSummary::default();
        for f in &self.files {
            match f.outcome {
                FileOutcome::Analyzed => s.analyzed += 1,
                FileOutcome::Rendered { .. } => s.rendered += 1,
                FileOutcome::SkippedUndetectable => s.skipped += 1,
                FileOutcome::Failed { .. } => s.failed += 1,
                FileOutcome::Cancelled => s.cancelled += 1,
            }
        }
        s
    }

    pub fn save_to_disk(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_from_disk(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let report = serde_json::from_reader(reader)?;
        Ok(report)
    }
}
