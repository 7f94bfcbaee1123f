// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::bpm::{OnsetOptions, TempoOptions};
use crate::decoder::LoaderOptions;
use crate::export::ExportOptions;
use crate::render::RenderOptions;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub onset: OnsetOptions,
    pub tempo: TempoOptions,
}

impl AnalysisOptions {
    pub fn validate(&self) -> crate::error::Result<()> {
        self.onset.validate()?;
        self.tempo.validate()
    }
}

/// Everything one file's pipeline needs. Handed to each pipeline
/// explicitly; nothing is read from global state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub analysis: AnalysisOptions,
    pub render: RenderOptions,
    pub loader: LoaderOptions,
    pub export: ExportOptions,
}

impl PipelineConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        self.analysis.validate()?;
        self.render.validate()
    }

    pub fn load_from_disk(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open config {}", path.display()))?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_disk(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
