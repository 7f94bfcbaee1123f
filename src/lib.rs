// src/lib.rs

pub mod audio;
pub mod batch;
pub mod bpm;
pub mod config;
pub mod decoder;
pub mod dsp;
pub mod error;
pub mod export;
pub mod render;

pub use audio::AudioBuffer;
pub use batch::{BatchJob, BatchReport, run_batch};
pub use bpm::{TempoAnalyzer, TempoEstimate, analyze_bpm_for_file, estimate_tempo};
pub use config::{AnalysisOptions, PipelineConfig};
pub use error::TempoError;
pub use render::{RenderOutcome, TempoAdjustmentRequest, render_at_tempo};
