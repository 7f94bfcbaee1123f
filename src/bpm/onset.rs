// src/bpm/onset.rs
use rustfft::{Fft, FftPlanner, num_complex::Complex, num_traits::Zero};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audio::AudioBuffer;
use crate::bpm::utils::{hann_window, rectified_flux};
use crate::error::{Result, TempoError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Half-wave rectified spectral flux over an STFT.
    Spectral,
    /// Half-wave rectified difference of short-time energy.
    Energy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetOptions {
    pub frame_size: usize,
    pub hop_size: usize,
    pub mode: AnalysisMode,
    /// `ln(1 + compression * |X|)` on spectral magnitudes; 0 keeps them linear.
    pub compression: f32,
}

impl Default for OnsetOptions {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 512,
            mode: AnalysisMode::Spectral,
            compression: 100.0,
        }
    }
}

impl OnsetOptions {
    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(TempoError::InvalidConfig("frame_size must be at least 1".into()));
        }
        if self.hop_size == 0 {
            return Err(TempoError::InvalidConfig("hop_size must be at least 1".into()));
        }
        if !self.compression.is_finite() || self.compression < 0.0 {
            return Err(TempoError::InvalidConfig(format!(
                "compression must be finite and non-negative, got {}",
                self.compression
            )));
        }
        Ok(())
    }
}

/// Onset strength per analysis frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetEnvelope {
    values: Vec<f32>,
    hop_size: usize,
    sample_rate: u32,
}

impl OnsetEnvelope {
    pub fn new(values: Vec<f32>, hop_size: usize, sample_rate: u32) -> Self {
        Self { values, hop_size, sample_rate }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Envelope frames per second; 0 when the envelope carries no timing.
    pub fn frame_rate(&self) -> f64 {
        if self.hop_size == 0 {
            return 0.0;
        }
        self.sample_rate as f64 / self.hop_size as f64
    }
}

/// Number of whole frames of `frame_size` that fit in `n` samples at `hop`.
pub fn frame_count(n: usize, frame_size: usize, hop: usize) -> usize {
    if frame_size == 0 || hop == 0 || n < frame_size {
        return 0;
    }
    (n - frame_size) / hop + 1
}

/// Reusable extractor: keeps the FFT plan and analysis window around
/// between buffers.
pub struct OnsetExtractor {
    opts: OnsetOptions,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl OnsetExtractor {
    pub fn new(opts: OnsetOptions) -> Result<Self> {
        opts.validate()?;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(opts.frame_size);
        let window = hann_window(opts.frame_size);
        Ok(Self { opts, fft, window })
    }

    pub fn options(&self) -> &OnsetOptions {
        &self.opts
    }

    pub fn extract(&self, buffer: &AudioBuffer) -> OnsetEnvelope {
        let hop = self.opts.hop_size;
        let sample_rate = buffer.sample_rate();
        if buffer.channels() == 0 || sample_rate == 0 || buffer.is_empty() {
            return OnsetEnvelope::new(Vec::new(), hop, sample_rate);
        }

        let mono = buffer.to_mono();
        let frames = frame_count(mono.len(), self.opts.frame_size, hop);
        if frames == 0 {
            return OnsetEnvelope::new(Vec::new(), hop, sample_rate);
        }

        let values = match self.opts.mode {
            AnalysisMode::Spectral => self.spectral_flux(&mono, frames),
            AnalysisMode::Energy => self.energy_flux(&mono, frames),
        };
        log::debug!(
            "onset envelope: {} frames at {:.2} fps ({:?})",
            values.len(),
            sample_rate as f64 / hop as f64,
            self.opts.mode
        );
        OnsetEnvelope::new(values, hop, sample_rate)
    }

    fn spectral_flux(&self, mono: &[f32], frames: usize) -> Vec<f32> {
        let n = self.opts.frame_size;
        let hop = self.opts.hop_size;
        let bins = n / 2 + 1;
        let gamma = self.opts.compression;

        let mut inbuf: Vec<Complex<f32>> = vec![Complex::zero(); n];
        let mut scratch = vec![Complex::zero(); self.fft.get_inplace_scratch_len()];
        let mut prev = vec![0.0f32; bins];
        let mut cur = vec![0.0f32; bins];
        let mut novelty = Vec::with_capacity(frames);

        for t in 0..frames {
            let pos = t * hop;
            for k in 0..n {
                inbuf[k] = Complex { re: mono[pos + k] * self.window[k], im: 0.0 };
            }
            self.fft.process_with_scratch(&mut inbuf, &mut scratch);
            for b in 0..bins {
                let mag = inbuf[b].norm();
                cur[b] = if gamma > 0.0 { (1.0 + gamma * mag).ln() } else { mag };
            }
            // first frame has nothing to rise from
            novelty.push(if t == 0 { 0.0 } else { rectified_flux(&prev, &cur) / bins as f32 });
            std::mem::swap(&mut prev, &mut cur);
        }
        novelty
    }

    fn energy_flux(&self, mono: &[f32], frames: usize) -> Vec<f32> {
        let n = self.opts.frame_size;
        let hop = self.opts.hop_size;
        let mut novelty = Vec::with_capacity(frames);
        let mut prev_energy = 0.0f32;

        for t in 0..frames {
            let pos = t * hop;
            let energy = mono[pos..pos + n].iter().map(|s| s * s).sum::<f32>() / n as f32;
            novelty.push(if t == 0 { 0.0 } else { (energy - prev_energy).max(0.0) });
            prev_energy = energy;
        }
        novelty
    }
}

/// One-shot form of [`OnsetExtractor::extract`].
pub fn onset_envelope(buffer: &AudioBuffer, opts: &OnsetOptions) -> Result<OnsetEnvelope> {
    Ok(OnsetExtractor::new(opts.clone())?.extract(buffer))
}
