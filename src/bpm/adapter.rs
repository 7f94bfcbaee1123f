// src/bpm/adapter.rs
use anyhow::Result;
use std::path::Path;

use crate::bpm::{TempoEstimate, estimate_tempo};
use crate::config::PipelineConfig;
use crate::decoder::load_audio_file;

/// Decodes a file and estimates its tempo.
pub fn analyze_bpm_for_file(path: &Path, config: &PipelineConfig) -> Result<TempoEstimate> {
    let buffer = load_audio_file(path, &config.loader)?;
    let estimate = estimate_tempo(&buffer, &config.analysis)?;
    if estimate.is_detected() {
        log::info!("🎵 [Analyzer] {}: {:.2} BPM", path.display(), estimate.reported_bpm());
    } else {
        log::warn!("[Analyzer] {}: tempo undetectable", path.display());
    }
    Ok(estimate)
}
