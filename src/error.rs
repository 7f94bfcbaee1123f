// src/error.rs

use thiserror::Error;

/// Errors raised by the analysis and rendering core.
///
/// An undetectable tempo is not an error: it travels as the zero-BPM
/// sentinel inside [`crate::bpm::TempoEstimate`].
#[derive(Debug, Error)]
pub enum TempoError {
    #[error("invalid target tempo {0} BPM: must be a positive, finite number")]
    InvalidTarget(f64),

    #[error("invalid current tempo {0} BPM: must be zero (undetectable) or positive")]
    InvalidCurrentTempo(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed audio buffer: {0}")]
    MalformedBuffer(String),

    #[error("speed factor x{0} is outside the supported range")]
    UnsupportedSpeed(f64),

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("failed to build resampler: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

pub type Result<T> = std::result::Result<T, TempoError>;
