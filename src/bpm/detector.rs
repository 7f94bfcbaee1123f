// src/bpm/detector.rs
use rustfft::{FftPlanner, num_complex::Complex, num_traits::Zero};
use serde::{Deserialize, Serialize};

use crate::bpm::onset::OnsetEnvelope;
use crate::bpm::utils::moving_average_inplace;
use crate::error::{Result, TempoError};

/// Scores closer than this (relative) are the same score.
const SCORE_EPSILON: f64 = 1e-9;

/// Envelopes with less energy than this are treated as silence.
const SILENCE_ENERGY: f64 = 1e-12;

/// Normalized scores below this are FFT round-off, not periodicity.
const MIN_PEAK_SCORE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoCandidate {
    pub bpm: f64,
    /// Autocorrelation at the candidate lag relative to lag 0.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Full precision; 0.0 means the tempo could not be detected.
    pub bpm: f64,
    pub confidence: f32,
    /// Scored candidates, strongest first.
    pub candidates: Vec<TempoCandidate>,
}

impl TempoEstimate {
    pub fn undetectable() -> Self {
        Self { bpm: 0.0, confidence: 0.0, candidates: Vec::new() }
    }

    pub fn is_detected(&self) -> bool {
        self.bpm > 0.0
    }

    /// BPM rounded to two decimals.
    pub fn reported_bpm(&self) -> f64 {
        round_bpm(self.bpm)
    }
}

pub fn round_bpm(bpm: f64) -> f64 {
    (bpm * 100.0).round() / 100.0
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoOptions {
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Moving-average radius applied to the envelope before autocorrelation.
    pub smoothing_radius: usize,
    /// Candidates within this fraction of the best score are ties.
    pub tie_tolerance: f64,
    /// Allowed relative deviation when deciding two tempi are integer multiples.
    pub harmonic_tolerance: f64,
    pub min_confidence: f32,
}

impl Default for TempoOptions {
    fn default() -> Self {
        Self {
            min_bpm: 40.0,
            max_bpm: 240.0,
            smoothing_radius: 1,
            tie_tolerance: 0.05,
            harmonic_tolerance: 0.03,
            min_confidence: 0.02,
        }
    }
}

impl TempoOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_bpm.is_finite() && self.min_bpm > 0.0) {
            return Err(TempoError::InvalidConfig(format!("min_bpm must be positive, got {}", self.min_bpm)));
        }
        if !(self.max_bpm.is_finite() && self.max_bpm > self.min_bpm) {
            return Err(TempoError::InvalidConfig(format!(
                "max_bpm ({}) must exceed min_bpm ({})",
                self.max_bpm, self.min_bpm
            )));
        }
        if !(0.0..1.0).contains(&self.tie_tolerance) {
            return Err(TempoError::InvalidConfig("tie_tolerance must lie in [0, 1)".into()));
        }
        if !(0.0..0.5).contains(&self.harmonic_tolerance) {
            return Err(TempoError::InvalidConfig("harmonic_tolerance must lie in [0, 0.5)".into()));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(TempoError::InvalidConfig("min_confidence must lie in [0, 1]".into()));
        }
        Ok(())
    }
}

/// Autocorrelation tempo estimator over onset envelopes.
pub struct BpmDetector {
    planner: FftPlanner<f64>,
    opts: TempoOptions,
}

impl BpmDetector {
    pub fn new(opts: TempoOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self { planner: FftPlanner::new(), opts })
    }

    pub fn detect(&mut self, envelope: &OnsetEnvelope) -> TempoEstimate {
        let opts = &self.opts;
        let frame_rate = envelope.frame_rate();
        if envelope.len() < 2 || frame_rate <= 0.0 {
            return TempoEstimate::undetectable();
        }

        // condition
        let mut env = envelope.values().to_vec();
        moving_average_inplace(&mut env, opts.smoothing_radius);
        let x: Vec<f64> = env.iter().map(|&v| v as f64).collect();

        let energy: f64 = x.iter().map(|v| v * v).sum();
        if energy <= SILENCE_ENERGY {
            log::debug!("tempo: silent envelope");
            return TempoEstimate::undetectable();
        }

        let n = x.len();
        let (lag_min, lag_max) = bpm_range_to_lag_range(opts.min_bpm, opts.max_bpm, frame_rate);
        // scores are needed one lag beyond each end for peak tests
        let lag_max = lag_max.min(n.saturating_sub(2));
        if lag_max <= lag_min {
            log::debug!("tempo: envelope of {n} frames too short for the search range");
            return TempoEstimate::undetectable();
        }

        let acf = autocorrelate_fft(&x, lag_max + 1, &mut self.planner);
        if acf[0] <= SILENCE_ENERGY {
            return TempoEstimate::undetectable();
        }
        let scores: Vec<f64> = acf.iter().map(|&v| v / acf[0]).collect();

        let mut candidates = pick_candidates(&scores, lag_min, lag_max, frame_rate)
            .into_iter()
            .filter(|c| c.bpm >= opts.min_bpm && c.bpm <= opts.max_bpm)
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return TempoEstimate::undetectable();
        }
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let confidence = prominence(&scores[lag_min..=lag_max], candidates[0].score);
        if confidence < opts.min_confidence {
            log::debug!("tempo: confidence {confidence:.3} below threshold");
            return TempoEstimate::undetectable();
        }

        let chosen = resolve_octave(&candidates, opts.tie_tolerance, opts.harmonic_tolerance);
        candidates.truncate(8);
        log::debug!("tempo: {:.2} BPM (confidence {:.2}, {} candidates)", chosen.bpm, confidence, candidates.len());

        TempoEstimate {
            bpm: chosen.bpm,
            confidence,
            candidates,
        }
    }
}

/// One-shot form of [`BpmDetector::detect`].
pub fn estimate_from_envelope(envelope: &OnsetEnvelope, opts: &TempoOptions) -> Result<TempoEstimate> {
    Ok(BpmDetector::new(opts.clone())?.detect(envelope))
}

// ---------- Helper functions ----------

/// Biased autocorrelation for lags `0..=max_lag` via a zero-padded FFT.
fn autocorrelate_fft(x: &[f64], max_lag: usize, planner: &mut FftPlanner<f64>) -> Vec<f64> {
    let n = x.len();
    let mut conv = 1usize;
    while conv < n * 2 { conv <<= 1; }
    let fft = planner.plan_fft_forward(conv);
    let ifft = planner.plan_fft_inverse(conv);
    let mut buf: Vec<Complex<f64>> = vec![Complex::zero(); conv];
    for (slot, &v) in buf.iter_mut().zip(x) { slot.re = v; }
    fft.process(&mut buf);
    for v in buf.iter_mut() {
        *v = Complex { re: v.norm_sqr(), im: 0.0 };
    }
    ifft.process(&mut buf);
    let scale = 1.0 / conv as f64;
    (0..=max_lag.min(n - 1)).map(|lag| buf[lag].re * scale).collect()
}

/// Local maxima of `scores` inside `lag_min..=lag_max`, refined by
/// parabolic interpolation. `scores` must extend to `lag_max + 1`.
fn pick_candidates(scores: &[f64], lag_min: usize, lag_max: usize, frame_rate: f64) -> Vec<TempoCandidate> {
    let mut out = Vec::new();
    for lag in lag_min.max(1)..=lag_max {
        let (prev, cur, next) = (scores[lag - 1], scores[lag], scores[lag + 1]);
        if cur < MIN_PEAK_SCORE || cur <= prev || cur < next {
            continue;
        }
        let denom = prev - 2.0 * cur + next;
        let delta = if denom.abs() > f64::EPSILON {
            (0.5 * (prev - next) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let refined_lag = lag as f64 + delta;
        out.push(TempoCandidate {
            bpm: 60.0 * frame_rate / refined_lag,
            score: cur,
        });
    }
    out
}

/// How far the best score stands out above the average score in range.
fn prominence(range_scores: &[f64], best: f64) -> f32 {
    if range_scores.is_empty() { return 0.0; }
    let mean = range_scores.iter().sum::<f64>() / range_scores.len() as f64;
    if mean >= 1.0 { return 0.0; }
    ((best - mean) / (1.0 - mean)).clamp(0.0, 1.0) as f32
}

fn is_integer_multiple(high: f64, low: f64, tolerance: f64) -> bool {
    if low <= 0.0 || high <= low { return false; }
    let ratio = high / low;
    let k = ratio.round();
    k >= 2.0 && ((ratio - k) / k).abs() <= tolerance
}

fn strictly_stronger(a: f64, b: f64) -> bool {
    a > b * (1.0 + SCORE_EPSILON)
}

/// Picks one candidate among near-ties, favouring the slower tempo.
///
/// Ties (within `tie_tolerance` of the best score) are visited from the
/// lowest BPM up. A tie is passed over when another tie at an integer
/// multiple of its tempo has strictly stronger autocorrelation; otherwise
/// the slowest tie wins. `candidates` must not be empty.
pub fn resolve_octave(candidates: &[TempoCandidate], tie_tolerance: f64, harmonic_tolerance: f64) -> TempoCandidate {
    let best = candidates
        .iter()
        .copied()
        .fold(candidates[0], |acc, c| if c.score > acc.score { c } else { acc });
    let floor = best.score * (1.0 - tie_tolerance);

    let mut ties: Vec<TempoCandidate> = candidates.iter().copied().filter(|c| c.score >= floor).collect();
    ties.sort_by(|a, b| a.bpm.partial_cmp(&b.bpm).unwrap_or(std::cmp::Ordering::Equal));

    for cand in &ties {
        let overruled = ties.iter().any(|h| {
            is_integer_multiple(h.bpm, cand.bpm, harmonic_tolerance) && strictly_stronger(h.score, cand.score)
        });
        if !overruled {
            return *cand;
        }
    }
    best
}

fn bpm_range_to_lag_range(min_bpm: f64, max_bpm: f64, frame_rate: f64) -> (usize, usize) {
    let lag_min = (frame_rate * 60.0 / max_bpm).floor() as usize;
    let lag_max = (frame_rate * 60.0 / min_bpm).ceil() as usize;
    (lag_min.max(1), lag_max.max(lag_min + 1))
}
