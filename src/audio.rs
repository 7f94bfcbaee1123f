// src/audio.rs

use crate::bpm::utils::downmix_to_mono;
use crate::error::{Result, TempoError};

/// Interleaved, normalized `f32` audio held entirely in memory.
///
/// Every pipeline stage takes a buffer by reference (or by value when it
/// consumes it) and produces a new one; nothing mutates a buffer it does
/// not own.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

impl AudioBuffer {
    /// Wraps interleaved samples.
    ///
    /// Zero channels, a zero sample rate and empty sample data are accepted
    /// here; analysis maps them to an empty envelope. The only rejected
    /// shape is a sample count that does not split evenly into frames.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Result<Self> {
        if channels > 0 && samples.len() % channels != 0 {
            return Err(TempoError::MalformedBuffer(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average of all channels, one value per frame.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 0 {
            return Vec::new();
        }
        downmix_to_mono(&self.samples, self.channels)
    }
}
