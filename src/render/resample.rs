// src/render/resample.rs

use rubato::{
    calculate_cutoff, FastFixedIn, PolynomialDegree, Resampler, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};

use crate::dsp;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleQuality {
    /// Band-limited sinc interpolation.
    Sinc,
    /// Cubic polynomial interpolation, no anti-aliasing.
    Fast,
}

pub fn build_sinc_resampler(ratio: f64, channels: usize, chunk_size: usize) -> Result<SincFixedIn<f32>> {
    let sinc_len = 256usize;
    let window = WindowFunction::BlackmanHarris2;
    let f_cutoff = calculate_cutoff(sinc_len, window);
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window,
    };
    Ok(SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, channels)?)
}

pub fn build_fast_resampler(ratio: f64, channels: usize, chunk_size: usize) -> Result<FastFixedIn<f32>> {
    Ok(FastFixedIn::<f32>::new(ratio, 2.0, PolynomialDegree::Cubic, chunk_size, channels)?)
}

/// Resamples whole planar channels by `ratio` (output rate / input rate)
/// and returns exactly `out_frames` frames per channel.
pub fn resample_to_length(
    planar: &[Vec<f32>],
    ratio: f64,
    out_frames: usize,
    quality: ResampleQuality,
    chunk_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let channels = planar.len();
    match quality {
        ResampleQuality::Sinc => {
            let mut r = build_sinc_resampler(ratio, channels, chunk_size)?;
            run_resampler(&mut r, planar, out_frames)
        }
        ResampleQuality::Fast => {
            let mut r = build_fast_resampler(ratio, channels, chunk_size)?;
            run_resampler(&mut r, planar, out_frames)
        }
    }
}

fn run_resampler<R: Resampler<f32>>(
    resampler: &mut R,
    planar: &[Vec<f32>],
    out_frames: usize,
) -> Result<Vec<Vec<f32>>> {
    let channels = planar.len();
    let in_frames = dsp::planar_len(planar);
    if in_frames == 0 || out_frames == 0 {
        return Ok(vec![Vec::new(); channels]);
    }

    let delay = resampler.output_delay();
    let wanted = delay + out_frames;
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted + resampler.output_frames_max()); channels];

    // 1. Full chunks, then the ragged tail
    let mut pos = 0usize;
    while pos < in_frames {
        let need = resampler.input_frames_next();
        let take = need.min(in_frames - pos);
        let block: Vec<&[f32]> = planar.iter().map(|ch| &ch[pos..pos + take]).collect();
        let produced = if take == need {
            resampler.process(&block, None)?
        } else {
            resampler.process_partial(Some(block.as_slice()), None)?
        };
        append(&mut out, produced);
        pos += take;
    }

    // 2. Flush the filter tail until the delayed output is complete
    while dsp::planar_len(&out) < wanted {
        let produced = resampler.process_partial::<Vec<f32>>(None, None)?;
        if produced.first().is_none_or(|ch| ch.is_empty()) {
            break;
        }
        append(&mut out, produced);
    }

    // 3. Drop the filter delay and pin the length
    for ch in out.iter_mut() {
        ch.drain(..delay.min(ch.len()));
        ch.resize(out_frames, 0.0);
    }
    Ok(out)
}

fn append(out: &mut [Vec<f32>], produced: Vec<Vec<f32>>) {
    for (dst, src) in out.iter_mut().zip(produced) {
        dst.extend_from_slice(&src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sr: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_exact_output_length() {
        let planar = vec![sine(440.0, 44100.0, 10_000)];
        for (ratio, out_frames) in [(0.5, 5_000usize), (2.0, 20_000), (1.0 / 1.4, 7_143)] {
            for quality in [ResampleQuality::Sinc, ResampleQuality::Fast] {
                let out = resample_to_length(&planar, ratio, out_frames, quality, 1024).unwrap();
                assert_eq!(out.len(), 1);
                assert_eq!(out[0].len(), out_frames);
            }
        }
    }

    #[test]
    fn test_delay_is_compensated() {
        // A slow sine upsampled by 2 should line up with a sine of the same
        // frequency at the doubled rate.
        let planar = vec![sine(100.0, 8000.0, 8000)];
        let out = resample_to_length(&planar, 2.0, 16_000, ResampleQuality::Sinc, 512).unwrap();
        let expected = sine(100.0, 16000.0, 16_000);
        for i in 2000..14_000 {
            assert!((out[0][i] - expected[i]).abs() < 0.05, "frame {i}: {} vs {}", out[0][i], expected[i]);
        }
    }

    #[test]
    fn test_empty_input() {
        let planar = vec![Vec::new(), Vec::new()];
        let out = resample_to_length(&planar, 1.5, 0, ResampleQuality::Sinc, 1024).unwrap();
        assert_eq!(out, vec![Vec::<f32>::new(), Vec::new()]);
    }

    #[test]
    fn test_invalid_ratio_is_error() {
        let planar = vec![vec![0.0f32; 100]];
        assert!(resample_to_length(&planar, 0.0, 10, ResampleQuality::Sinc, 1024).is_err());
    }
}
