// tests/pipeline.rs

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bpm_adjuster::bpm::{AnalysisMode, OnsetOptions};
use bpm_adjuster::config::AnalysisOptions;
use bpm_adjuster::decoder::{LoaderOptions, load_audio_file};
use bpm_adjuster::export::{ExportOptions, export_wav, output_path_for};
use bpm_adjuster::render::{RenderOptions, rendered_frames};
use bpm_adjuster::{AudioBuffer, RenderOutcome, TempoAdjustmentRequest, estimate_tempo, render_at_tempo};

const SR: u32 = 44100;

/// 1 kHz bursts with a 30 ms decay, one per beat.
fn click_track(bpm: f64, secs: f64) -> AudioBuffer {
    let total = (SR as f64 * secs) as usize;
    let period = SR as f64 * 60.0 / bpm;
    let burst = (SR as f64 * 0.03) as usize;
    let mut samples = vec![0.0f32; total];
    let mut beat = 0usize;
    loop {
        let start = (beat as f64 * period).round() as usize;
        if start >= total { break; }
        for (k, s) in samples[start..(start + burst).min(total)].iter_mut().enumerate() {
            let t = k as f32 / SR as f32;
            let env = 1.0 - k as f32 / burst as f32;
            *s = 0.8 * env * (2.0 * std::f32::consts::PI * 1000.0 * t).sin();
        }
        beat += 1;
    }
    AudioBuffer::mono(samples, SR)
}

#[test]
fn recovers_120_bpm_click_track() {
    let estimate = estimate_tempo(&click_track(120.0, 12.0), &AnalysisOptions::default()).unwrap();
    assert!(estimate.is_detected());
    assert!((estimate.bpm - 120.0).abs() <= 2.0, "got {}", estimate.bpm);
    assert!(estimate.confidence > 0.0);
}

#[test]
fn recovers_120_bpm_with_energy_onsets() {
    let opts = AnalysisOptions {
        onset: OnsetOptions { mode: AnalysisMode::Energy, ..Default::default() },
        ..Default::default()
    };
    let estimate = estimate_tempo(&click_track(120.0, 12.0), &opts).unwrap();
    assert!(estimate.is_detected());
    assert!((estimate.bpm - 120.0).abs() <= 2.0, "got {}", estimate.bpm);
}

#[test]
fn stereo_click_track_matches_mono() {
    let mono = click_track(120.0, 8.0);
    let stereo: Vec<f32> = mono.samples().iter().flat_map(|&s| [s, s]).collect();
    let stereo = AudioBuffer::new(stereo, SR, 2).unwrap();
    let opts = AnalysisOptions::default();
    let a = estimate_tempo(&mono, &opts).unwrap();
    let b = estimate_tempo(&stereo, &opts).unwrap();
    assert!((a.bpm - b.bpm).abs() < 1e-6);
}

#[test]
fn silence_is_undetectable() {
    let silent = AudioBuffer::mono(vec![0.0; SR as usize * 5], SR);
    let estimate = estimate_tempo(&silent, &AnalysisOptions::default()).unwrap();
    assert_eq!(estimate.bpm, 0.0);
    assert!(!estimate.is_detected());

    let req = TempoAdjustmentRequest::new(silent, estimate.bpm, 128.0).unwrap();
    let outcome = render_at_tempo(req, &RenderOptions::default()).unwrap();
    assert_eq!(outcome, RenderOutcome::SkippedUndetectable);
}

#[test]
fn end_to_end_100_to_140() {
    let input = click_track(100.0, 10.0);
    assert_eq!(input.frames(), 441_000);

    let estimate = estimate_tempo(&input, &AnalysisOptions::default()).unwrap();
    assert!((estimate.bpm - 100.0).abs() <= 2.0, "got {}", estimate.bpm);

    // with the detected tempo
    let req = TempoAdjustmentRequest::new(input.clone(), estimate.bpm, 140.0).unwrap();
    let speed = req.speed_factor().unwrap();
    let out = render_at_tempo(req, &RenderOptions::default()).unwrap().into_buffer().unwrap();
    assert!(out.frames().abs_diff(rendered_frames(441_000, speed)) <= 1);

    // with the exact tempo
    let req = TempoAdjustmentRequest::new(input, 100.0, 140.0).unwrap();
    assert!((req.speed_factor().unwrap() - 1.4).abs() < 1e-12);
    let out = render_at_tempo(req, &RenderOptions::default()).unwrap().into_buffer().unwrap();
    assert!(out.frames().abs_diff(315_000) <= 1);
    assert_eq!(out.sample_rate(), SR);
    assert!((out.duration_secs() - 7.142857).abs() < 1e-3);
}

#[test]
fn rendered_click_track_detects_at_new_tempo() {
    let req = TempoAdjustmentRequest::new(click_track(100.0, 12.0), 100.0, 125.0).unwrap();
    let out = render_at_tempo(req, &RenderOptions::default()).unwrap().into_buffer().unwrap();
    let estimate = estimate_tempo(&out, &AnalysisOptions::default()).unwrap();
    assert!((estimate.bpm - 125.0).abs() <= 2.5, "got {}", estimate.bpm);
}

#[test]
fn analysis_and_render_are_deterministic() {
    let input = click_track(97.0, 6.0);
    let opts = AnalysisOptions::default();
    let a = estimate_tempo(&input, &opts).unwrap();
    let b = estimate_tempo(&input, &opts).unwrap();
    assert_eq!(a, b);

    let render = |buf: AudioBuffer| {
        let req = TempoAdjustmentRequest::new(buf, a.bpm, 130.0).unwrap();
        render_at_tempo(req, &RenderOptions::default()).unwrap().into_buffer().unwrap()
    };
    let x = render(input.clone());
    let y = render(input);
    assert_eq!(x.samples().len(), y.samples().len());
    assert!(x.samples().iter().zip(y.samples()).all(|(p, q)| p.to_bits() == q.to_bits()));
}

#[test]
fn white_noise_yields_a_valid_estimate() {
    let mut rng = StdRng::seed_from_u64(7);
    let noise: Vec<f32> = (0..SR as usize * 6).map(|_| rng.random_range(-0.5..0.5)).collect();
    let estimate = estimate_tempo(&AudioBuffer::mono(noise, SR), &AnalysisOptions::default()).unwrap();
    assert!(estimate.bpm == 0.0 || (40.0..=240.0).contains(&estimate.bpm), "got {}", estimate.bpm);
    assert!((0.0..=1.0).contains(&estimate.confidence));
}

#[test]
fn exported_render_reloads_with_same_shape() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("loop.wav");
    export_wav(&click_track(100.0, 4.0), &input_path, &ExportOptions::default()).unwrap();

    let loaded = load_audio_file(&input_path, &LoaderOptions::default()).unwrap();
    assert_eq!(loaded.frames(), 176_400);

    let req = TempoAdjustmentRequest::new(loaded, 100.0, 80.0).unwrap();
    let rendered = render_at_tempo(req, &RenderOptions::default()).unwrap().into_buffer().unwrap();
    let out_path = output_path_for(&input_path, dir.path(), 80.0);
    assert!(out_path.ends_with("loop_80.wav"));
    export_wav(&rendered, &out_path, &ExportOptions::default()).unwrap();

    let back = load_audio_file(&out_path, &LoaderOptions::default()).unwrap();
    assert_eq!(back.frames(), 220_500);
    assert_eq!(back.sample_rate(), SR);
}
