// src/export.rs

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::AudioBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WavEncoding {
    #[default]
    Pcm16,
    Float32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub encoding: WavEncoding,
}

/// `<dir>/<stem>_<target>.wav`, with the target truncated to an integer.
pub fn output_path_for(input: &Path, output_dir: &Path, target_bpm: f64) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{}_{}.wav", stem, target_bpm.trunc() as i64))
}

/// Like [`output_path_for`] but keeps the source extension in the name,
/// `<dir>/<stem>_<ext>_<target>.wav`, for inputs that share a stem.
pub fn output_path_with_extension(input: &Path, output_dir: &Path, target_bpm: f64) -> PathBuf {
    let plain = output_path_for(input, output_dir, target_bpm);
    let Some(ext) = input.extension() else { return plain };
    let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    output_dir.join(format!("{}_{}_{}.wav", stem, ext.to_string_lossy(), target_bpm.trunc() as i64))
}

/// Writes `buffer` as a WAV file.
///
/// Samples go to a sibling `.partial` file which is renamed over `path`
/// only after the writer finalized, so `path` never holds a truncated file.
pub fn export_wav(buffer: &AudioBuffer, path: &Path, opts: &ExportOptions) -> Result<()> {
    if buffer.channels() == 0 || buffer.channels() > u16::MAX as usize {
        bail!("cannot write {} channel(s) to WAV", buffer.channels());
    }
    if buffer.sample_rate() == 0 {
        bail!("cannot write WAV with a sample rate of 0 Hz");
    }

    let partial = partial_path(path);
    if let Err(e) = write_wav(buffer, &partial, opts.encoding) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    fs::rename(&partial, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    log::debug!("💾 [Export] wrote {} ({:.2}s)", path.display(), buffer.duration_secs());
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn write_wav(buffer: &AudioBuffer, path: &Path, encoding: WavEncoding) -> Result<()> {
    let (bits_per_sample, sample_format) = match encoding {
        WavEncoding::Pcm16 => (16, SampleFormat::Int),
        WavEncoding::Float32 => (32, SampleFormat::Float),
    };
    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample,
        sample_format,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;

    match encoding {
        WavEncoding::Pcm16 => {
            for &s in buffer.samples() {
                // clamp and convert
                let samp = if s.is_finite() {
                    (s.clamp(-1.0, 1.0) * (i16::MAX as f32)) as i16
                } else {
                    0i16
                };
                writer.write_sample(samp)?;
            }
        }
        WavEncoding::Float32 => {
            for &s in buffer.samples() {
                writer.write_sample(if s.is_finite() { s } else { 0.0 })?;
            }
        }
    }

    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{LoaderOptions, load_audio_file};

    #[test]
    fn test_output_naming() {
        let p = output_path_for(Path::new("/music/track one.mp3"), Path::new("/music/adjusted_bpm"), 127.9);
        assert_eq!(p, PathBuf::from("/music/adjusted_bpm/track one_127.wav"));
    }

    #[test]
    fn test_output_naming_with_extension() {
        let p = output_path_with_extension(Path::new("/music/song.mp3"), Path::new("/out"), 120.0);
        assert_eq!(p, PathBuf::from("/out/song_mp3_120.wav"));
        let bare = output_path_with_extension(Path::new("/music/song"), Path::new("/out"), 120.0);
        assert_eq!(bare, PathBuf::from("/out/song_120.wav"));
    }

    #[test]
    fn test_export_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<f32> = (0..2000).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect();
        let buf = AudioBuffer::new(samples.clone(), 32000, 2).unwrap();
        export_wav(&buf, &path, &ExportOptions::default()).unwrap();

        assert!(!partial_path(&path).exists());
        let back = load_audio_file(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(back.sample_rate(), 32000);
        assert_eq!(back.channels(), 2);
        assert_eq!(back.frames(), 1000);
        for (a, b) in samples.iter().zip(back.samples()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_float_export_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let buf = AudioBuffer::mono(vec![0.125, -0.75, 0.3333], 44100);
        export_wav(&buf, &path, &ExportOptions { encoding: WavEncoding::Float32 }).unwrap();
        let mut reader = hound::WavReader::open(&path).unwrap();
        let back: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(back, vec![0.125, -0.75, 0.3333]);
    }

    #[test]
    fn test_unwritable_target_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("out.wav");
        let buf = AudioBuffer::mono(vec![0.0; 10], 44100);
        assert!(export_wav(&buf, &path, &ExportOptions::default()).is_err());
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_rejects_channelless_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let buf = AudioBuffer::new(vec![], 44100, 0).unwrap();
        assert!(export_wav(&buf, &dir.path().join("x.wav"), &ExportOptions::default()).is_err());
    }
}
