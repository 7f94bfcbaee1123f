// src/render/mod.rs

pub mod resample;

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::dsp;
use crate::error::{Result, TempoError};

pub use resample::ResampleQuality;

/// Largest supported `target / current` ratio, and its reciprocal the smallest.
pub const MAX_SPEED_FACTOR: f64 = 16.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub quality: ResampleQuality,
    /// Frames fed to the resampler per call.
    pub chunk_size: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            quality: ResampleQuality::Sinc,
            chunk_size: 1024,
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(TempoError::InvalidConfig("chunk_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// One tempo change for one buffer. Built per file, consumed once by
/// [`render_at_tempo`].
#[derive(Debug, Clone)]
pub struct TempoAdjustmentRequest {
    buffer: AudioBuffer,
    current_bpm: f64,
    target_bpm: f64,
}

impl TempoAdjustmentRequest {
    /// `current_bpm` may be the 0.0 "undetectable" sentinel; `target_bpm`
    /// must be positive.
    pub fn new(buffer: AudioBuffer, current_bpm: f64, target_bpm: f64) -> Result<Self> {
        if !target_bpm.is_finite() || target_bpm <= 0.0 {
            return Err(TempoError::InvalidTarget(target_bpm));
        }
        if !current_bpm.is_finite() || current_bpm < 0.0 {
            return Err(TempoError::InvalidCurrentTempo(current_bpm));
        }
        Ok(Self { buffer, current_bpm, target_bpm })
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn current_bpm(&self) -> f64 {
        self.current_bpm
    }

    pub fn target_bpm(&self) -> f64 {
        self.target_bpm
    }

    /// `target / current`, or `None` when the current tempo is unknown.
    pub fn speed_factor(&self) -> Option<f64> {
        if self.current_bpm > 0.0 {
            Some(self.target_bpm / self.current_bpm)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(AudioBuffer),
    /// The source tempo was undetectable; nothing was produced.
    SkippedUndetectable,
}

impl RenderOutcome {
    pub fn buffer(&self) -> Option<&AudioBuffer> {
        match self {
            RenderOutcome::Rendered(buf) => Some(buf),
            RenderOutcome::SkippedUndetectable => None,
        }
    }

    pub fn into_buffer(self) -> Option<AudioBuffer> {
        match self {
            RenderOutcome::Rendered(buf) => Some(buf),
            RenderOutcome::SkippedUndetectable => None,
        }
    }
}

/// Per-channel frame count after a speed change.
pub fn rendered_frames(frames: usize, speed_factor: f64) -> usize {
    (frames as f64 / speed_factor).round() as usize
}

/// Re-renders the request's buffer at its target tempo.
///
/// The samples are treated as if recorded at `sample_rate * speed_factor`
/// and resampled back to `sample_rate`, so pitch follows tempo. The
/// returned buffer keeps the source sample rate.
pub fn render_at_tempo(request: TempoAdjustmentRequest, opts: &RenderOptions) -> Result<RenderOutcome> {
    opts.validate()?;
    let Some(speed_factor) = request.speed_factor() else {
        log::warn!("Could not detect BPM for this buffer; skipping tempo change");
        return Ok(RenderOutcome::SkippedUndetectable);
    };

    if !(1.0 / MAX_SPEED_FACTOR..=MAX_SPEED_FACTOR).contains(&speed_factor) {
        return Err(TempoError::UnsupportedSpeed(speed_factor));
    }

    let source = request.buffer;
    let sample_rate = source.sample_rate();
    let channels = source.channels();
    if channels == 0 || sample_rate == 0 {
        return Err(TempoError::UnsupportedInput(format!(
            "cannot resample {channels} channel(s) at {sample_rate} Hz"
        )));
    }

    if speed_factor == 1.0 {
        return Ok(RenderOutcome::Rendered(source));
    }

    let out_frames = rendered_frames(source.frames(), speed_factor);
    let virtual_rate = sample_rate as f64 * speed_factor;
    let ratio = sample_rate as f64 / virtual_rate;
    log::debug!(
        "render: {:.2} -> {:.2} BPM, speed x{:.4}, {} -> {} frames",
        request.current_bpm,
        request.target_bpm,
        speed_factor,
        source.frames(),
        out_frames
    );

    let planar = dsp::deinterleave(source.samples(), channels);
    drop(source);
    let rendered = resample::resample_to_length(&planar, ratio, out_frames, opts.quality, opts.chunk_size)?;
    let buffer = AudioBuffer::new(dsp::interleave(&rendered), sample_rate, channels)?;
    Ok(RenderOutcome::Rendered(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize, channels: usize) -> AudioBuffer {
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let s = (i as f32 * 0.01).sin() * 0.4;
            for _ in 0..channels {
                samples.push(s);
            }
        }
        AudioBuffer::new(samples, 44100, channels).unwrap()
    }

    #[test]
    fn test_rejects_non_positive_target() {
        for target in [0.0, -120.0, f64::NAN, f64::INFINITY] {
            let err = TempoAdjustmentRequest::new(tone(10, 1), 120.0, target).unwrap_err();
            assert!(matches!(err, TempoError::InvalidTarget(_)));
        }
    }

    #[test]
    fn test_rejects_extreme_speed_before_allocating() {
        for (current, target) in [(120.0, 1e-9), (120.0, 7.0), (60.0, 1e12), (10.0, 161.0)] {
            let req = TempoAdjustmentRequest::new(tone(44_100, 1), current, target).unwrap();
            let err = render_at_tempo(req, &RenderOptions::default()).unwrap_err();
            assert!(matches!(err, TempoError::UnsupportedSpeed(_)), "{current}->{target}");
        }
    }

    #[test]
    fn test_speed_limits_are_inclusive() {
        let opts = RenderOptions::default();
        let slow = TempoAdjustmentRequest::new(tone(1_000, 1), 160.0, 10.0).unwrap();
        assert_eq!(render_at_tempo(slow, &opts).unwrap().into_buffer().unwrap().frames(), 16_000);
        let fast = TempoAdjustmentRequest::new(tone(16_000, 1), 10.0, 160.0).unwrap();
        assert_eq!(render_at_tempo(fast, &opts).unwrap().into_buffer().unwrap().frames(), 1_000);
    }

    #[test]
    fn test_rejects_negative_current() {
        let err = TempoAdjustmentRequest::new(tone(10, 1), -1.0, 120.0).unwrap_err();
        assert!(matches!(err, TempoError::InvalidCurrentTempo(_)));
    }

    #[test]
    fn test_skips_undetectable() {
        let req = TempoAdjustmentRequest::new(tone(1000, 1), 0.0, 120.0).unwrap();
        assert_eq!(req.speed_factor(), None);
        let outcome = render_at_tempo(req, &RenderOptions::default()).unwrap();
        assert_eq!(outcome, RenderOutcome::SkippedUndetectable);
        assert!(outcome.buffer().is_none());
    }

    #[test]
    fn test_scaling_law() {
        let opts = RenderOptions::default();
        for (current, target) in [(100.0, 140.0), (128.0, 120.0), (90.0, 180.0), (120.0, 121.5)] {
            let input = tone(20_000, 2);
            let req = TempoAdjustmentRequest::new(input, current, target).unwrap();
            let expected = (20_000.0 / (target / current)).round() as usize;
            let out = render_at_tempo(req, &opts).unwrap().into_buffer().unwrap();
            assert_eq!(out.channels(), 2);
            assert_eq!(out.sample_rate(), 44100);
            assert!(out.frames().abs_diff(expected) <= 1, "{current}->{target}: {} vs {expected}", out.frames());
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let input = tone(30_000, 1);
        let a = render_at_tempo(TempoAdjustmentRequest::new(input.clone(), 97.3, 128.0).unwrap(), &RenderOptions::default()).unwrap();
        let b = render_at_tempo(TempoAdjustmentRequest::new(input, 97.3, 128.0).unwrap(), &RenderOptions::default()).unwrap();
        let (a, b) = (a.into_buffer().unwrap(), b.into_buffer().unwrap());
        let bits_a: Vec<u32> = a.samples().iter().map(|s| s.to_bits()).collect();
        let bits_b: Vec<u32> = b.samples().iter().map(|s| s.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn test_unit_speed_copies() {
        let input = tone(500, 2);
        let req = TempoAdjustmentRequest::new(input.clone(), 120.0, 120.0).unwrap();
        let out = render_at_tempo(req, &RenderOptions::default()).unwrap();
        assert_eq!(out, RenderOutcome::Rendered(input));
    }

    #[test]
    fn test_zero_channel_buffer_is_unsupported() {
        let input = AudioBuffer::new(vec![], 44100, 0).unwrap();
        let req = TempoAdjustmentRequest::new(input, 100.0, 120.0).unwrap();
        assert!(matches!(render_at_tempo(req, &RenderOptions::default()), Err(TempoError::UnsupportedInput(_))));
    }

    #[test]
    fn test_fast_quality_keeps_length() {
        let opts = RenderOptions { quality: ResampleQuality::Fast, ..Default::default() };
        let req = TempoAdjustmentRequest::new(tone(10_000, 1), 120.0, 60.0).unwrap();
        let out = render_at_tempo(req, &opts).unwrap().into_buffer().unwrap();
        assert_eq!(out.frames(), 20_000);
    }

    #[test]
    fn test_empty_buffer_renders_empty() {
        let req = TempoAdjustmentRequest::new(AudioBuffer::mono(vec![], 44100), 100.0, 120.0).unwrap();
        let out = render_at_tempo(req, &RenderOptions::default()).unwrap().into_buffer().unwrap();
        assert!(out.is_empty());
    }
}
