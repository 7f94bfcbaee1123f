// src/dsp.rs

/// Splits interleaved samples into one vector per channel.
pub fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    if channels == 0 {
        return Vec::new();
    }
    let frames = interleaved.len() / channels;
    let mut planar: Vec<Vec<f32>> = (0..channels).map(|_| Vec::with_capacity(frames)).collect();
    for row in interleaved.chunks_exact(channels) {
        for (ch, &s) in row.iter().enumerate() {
            planar[ch].push(s);
        }
    }
    planar
}

pub fn planar_len(planar: &[Vec<f32>]) -> usize {
    planar.iter().map(|v| v.len()).min().unwrap_or(0)
}

pub fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let channels = planar.len();
    if channels == 0 {
        return Vec::new();
    }
    let frames = planar_len(planar);
    let mut out = vec![0.0f32; frames * channels];
    for f in 0..frames {
        for ch in 0..channels {
            out[f * channels + ch] = planar[ch][f];
        }
    }
    out
}

/// Converts interleaved frames from `in_ch` to `out_ch` channels.
///
/// Reducing averages the input channels round-robin onto the outputs
/// (stereo to mono is `(l + r) / 2`); expanding repeats them.
pub fn remix_channels(input: &[f32], in_ch: usize, out_ch: usize) -> Vec<f32> {
    if in_ch == out_ch || in_ch == 0 || out_ch == 0 {
        return input.to_vec();
    }
    let mut out = Vec::with_capacity(input.len() / in_ch * out_ch);
    for frame in input.chunks_exact(in_ch) {
        if out_ch > in_ch {
            out.extend((0..out_ch).map(|oc| frame[oc % in_ch]));
        } else {
            for oc in 0..out_ch {
                let (sum, n) = frame[oc..]
                    .iter()
                    .step_by(out_ch)
                    .fold((0.0f32, 0usize), |(s, n), &x| (s + x, n + 1));
                out.push(sum / n as f32);
            }
        }
    }
    out
}
