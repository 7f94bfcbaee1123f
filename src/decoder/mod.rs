// src/decoder/mod.rs

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::audio::AudioBuffer;
use crate::dsp;

/// How loudly the loader reports packets it had to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Skipped packets are logged at debug level only.
    Quiet,
    #[default]
    Normal,
    /// Also logs the locked stream format.
    Verbose,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    pub verbosity: Verbosity,
}

/// Decodes the default track of an audio file into one interleaved buffer.
///
/// The channel layout and rate of the first non-empty packet win; later
/// packets with another layout are up/down-mixed to match.
pub fn load_audio_file(path: &Path, opts: &LoaderOptions) -> Result<AudioBuffer> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("unrecognized audio format: {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no default audio track in {}", path.display()))?;
    let track_id = track.id;
    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut out = Vec::<f32>::new();
    let mut locked: Option<(u32, usize)> = None;
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).with_context(|| format!("failed reading {}", path.display())),
        };
        if packet.track_id() != track_id { continue; }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                skipped += 1;
                report_skip(opts.verbosity, path, msg);
                continue;
            }
            Err(SymphoniaError::IoError(e)) => {
                skipped += 1;
                report_skip(opts.verbosity, path, &e.to_string());
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("failed decoding {}", path.display())),
        };

        let spec = *decoded.spec();
        let packet_channels = spec.channels.count();
        if decoded.frames() == 0 { continue; }

        // 1. Lock format on the first non-empty packet
        let (_, channels) = *locked.get_or_insert_with(|| {
            if opts.verbosity == Verbosity::Verbose {
                log::info!("🔍 [Loader] {}: {} Hz / {} ch", path.display(), spec.rate, packet_channels);
            }
            (spec.rate, packet_channels)
        });

        // 2. Prepare buffer
        let needs_alloc = sample_buf
            .as_ref()
            .is_none_or(|b| b.capacity() < decoded.capacity());
        if needs_alloc {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else { continue };
        buf.copy_interleaved_ref(decoded);
        let new_samples = buf.samples();

        // 3. Match the locked layout
        if packet_channels == channels {
            out.extend_from_slice(new_samples);
        } else {
            out.extend(dsp::remix_channels(new_samples, packet_channels, channels));
        }
    }

    let Some((sample_rate, channels)) = locked else {
        return Err(anyhow!("no decodable audio in {}", path.display()));
    };
    if skipped > 0 && opts.verbosity != Verbosity::Quiet {
        log::warn!("[Loader] {}: skipped {skipped} undecodable packet(s)", path.display());
    }
    log::debug!("📊 [Loader] Decoded {} samples from {}", out.len(), path.display());
    Ok(AudioBuffer::new(out, sample_rate, channels)?)
}

fn report_skip(verbosity: Verbosity, path: &Path, msg: &str) {
    match verbosity {
        Verbosity::Quiet => log::debug!("[Loader] {}: skipping packet: {msg}", path.display()),
        Verbosity::Normal | Verbosity::Verbose => {
            log::warn!("[Loader] {}: skipping packet: {msg}", path.display())
        }
    }
}
