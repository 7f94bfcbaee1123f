// src/bpm/utils.rs
use std::f32::consts::PI;

/// Periodic Hann window of length `n`.
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n).map(|i| {
        0.5 * (1.0 - (2.0 * PI * i as f32 / (n as f32)).cos())
    }).collect()
}

pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 { return interleaved.to_vec(); }
    let frames = interleaved.len() / channels;
    let mut out = Vec::with_capacity(frames);
    for chunk in interleaved.chunks_exact(channels) {
        let mut s = 0.0f32;
        for &c in chunk { s += c; }
        out.push(s / channels as f32);
    }
    out
}

/// Centered moving average. Edges average over the part of the window
/// that lies inside the signal.
pub fn moving_average_inplace(x: &mut [f32], radius: usize) {
    if radius == 0 || x.is_empty() { return; }
    let n = x.len();
    let mut out = vec![0.0f32; n];
    let mut sum = 0.0f32;
    for &v in &x[..=radius.min(n - 1)] { sum += v; }
    for i in 0..n {
        if i > 0 {
            let add = i + radius;
            if add < n { sum += x[add]; }
            if i > radius { sum -= x[i - radius - 1]; }
        }
        let left = i.saturating_sub(radius);
        let right = (i + radius).min(n - 1);
        out[i] = sum / (right - left + 1) as f32;
    }
    x.copy_from_slice(&out);
}

/// Sum of the positive parts of `cur - prev`.
#[inline]
pub fn rectified_flux(prev: &[f32], cur: &[f32]) -> f32 {
    prev.iter()
        .zip(cur)
        .map(|(&p, &c)| (c - p).max(0.0))
        .sum()
}
