// src/batch/mod.rs

pub mod report;

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;

use crate::bpm::{TempoAnalyzer, TempoEstimate};
use crate::config::PipelineConfig;
use crate::decoder::load_audio_file;
use crate::error::TempoError;
use crate::export::{export_wav, output_path_for, output_path_with_extension};
use crate::render::{render_at_tempo, RenderOutcome, TempoAdjustmentRequest};

pub use report::{BatchReport, BatchSummary, FileOutcome, FileReport};

pub const DEFAULT_EXTENSIONS: [&str; 2] = ["mp3", "wav"];
pub const DEFAULT_OUTPUT_DIR: &str = "adjusted_bpm";

/// What to do with a folder of audio files.
#[derive(Debug, Clone)]
pub struct BatchJob {
    folder: PathBuf,
    target_bpm: Option<f64>,
    output_dir_name: String,
    extensions: Vec<String>,
    workers: usize,
}

impl BatchJob {
    /// Estimate tempo only.
    pub fn analyze(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            target_bpm: None,
            output_dir_name: DEFAULT_OUTPUT_DIR.to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            workers: default_workers(),
        }
    }

    /// Estimate tempo and render every file at `target_bpm`.
    pub fn adjust(folder: impl Into<PathBuf>, target_bpm: f64) -> Result<Self, TempoError> {
        if !target_bpm.is_finite() || target_bpm <= 0.0 {
            return Err(TempoError::InvalidTarget(target_bpm));
        }
        Ok(Self { target_bpm: Some(target_bpm), ..Self::analyze(folder) })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(|e| e.into().to_ascii_lowercase()).collect();
        self
    }

    pub fn with_output_dir_name(mut self, name: impl Into<String>) -> Self {
        self.output_dir_name = name.into();
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn target_bpm(&self) -> Option<f64> {
        self.target_bpm
    }

    pub fn output_dir(&self) -> PathBuf {
        self.folder.join(&self.output_dir_name)
    }
}

fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub file: String,
}

/// Audio files directly inside `folder` whose extension is in `extensions`
/// (case-insensitive), sorted by path.
pub fn scan_audio_files(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("cannot read folder {}", folder.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() { continue; }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

struct WorkerCtx<'a> {
    job: &'a BatchJob,
    config: &'a PipelineConfig,
    files: &'a [PathBuf],
    outputs: &'a [PathBuf],
    cursor: AtomicUsize,
    cancel: &'a AtomicBool,
}

/// Runs one pipeline per file on a pool of worker threads.
///
/// Per-file failures end up as [`FileOutcome::Failed`] rows; only an
/// invalid configuration or an unreadable folder fails the whole batch.
/// Setting `cancel` stops workers from starting new files; files already
/// in flight finish. `progress` runs on the calling thread after each
/// file.
pub fn run_batch<F>(job: &BatchJob, config: &PipelineConfig, cancel: &AtomicBool, mut progress: F) -> Result<BatchReport>
where
    F: FnMut(&BatchProgress),
{
    config.validate()?;
    let files = scan_audio_files(&job.folder, &job.extensions)?;
    log::info!("Found {} audio files in {}", files.len(), job.folder.display());

    if job.target_bpm.is_some() && !files.is_empty() {
        let out_dir = job.output_dir();
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("cannot create output folder {}", out_dir.display()))?;
    }

    let total = files.len();
    let workers = job.workers.clamp(1, total.max(1));
    let outputs = match job.target_bpm {
        Some(target) => plan_outputs(&files, &job.output_dir(), target),
        None => Vec::new(),
    };
    let ctx = WorkerCtx { job, config, files: &files, outputs: &outputs, cursor: AtomicUsize::new(0), cancel };
    let mut slots: Vec<Option<FileReport>> = vec![None; total];

    thread::scope(|s| {
        let (tx, rx) = mpsc::channel::<(usize, FileReport)>();
        for _ in 0..workers {
            let tx = tx.clone();
            let ctx = &ctx;
            s.spawn(move || worker_loop(ctx, tx));
        }
        drop(tx);

        let mut completed = 0usize;
        for (idx, report) in rx {
            completed += 1;
            progress(&BatchProgress { completed, total, file: report.file.clone() });
            slots[idx] = Some(report);
        }
    });

    let reports = slots
        .into_iter()
        .zip(&files)
        .map(|(slot, path)| {
            slot.unwrap_or_else(|| FileReport {
                file: display_name(path),
                current_bpm: None,
                target_bpm: job.target_bpm,
                outcome: FileOutcome::Failed { error: "worker stopped before reporting".into() },
            })
        })
        .collect();

    Ok(BatchReport {
        version: 1,
        folder: job.folder.clone(),
        target_bpm: job.target_bpm,
        files: reports,
    })
}

fn worker_loop(ctx: &WorkerCtx<'_>, tx: Sender<(usize, FileReport)>) {
    let mut analyzer = match TempoAnalyzer::new(&ctx.config.analysis) {
        Ok(a) => Some(a),
        Err(e) => {
            log::error!("worker could not start analysis: {e}");
            None
        }
    };

    loop {
        let idx = ctx.cursor.fetch_add(1, Ordering::Relaxed);
        let Some(path) = ctx.files.get(idx) else { break };

        let report = if ctx.cancel.load(Ordering::Relaxed) {
            FileReport {
                file: display_name(path),
                current_bpm: None,
                target_bpm: ctx.job.target_bpm,
                outcome: FileOutcome::Cancelled,
            }
        } else {
            match analyzer.as_mut() {
                Some(a) => process_file(a, path, ctx.outputs.get(idx).map(PathBuf::as_path), ctx.job, ctx.config),
                None => FileReport {
                    file: display_name(path),
                    current_bpm: None,
                    target_bpm: ctx.job.target_bpm,
                    outcome: FileOutcome::Failed { error: "analysis unavailable".into() },
                },
            }
        };

        if tx.send((idx, report)).is_err() {
            break;
        }
    }
}

/// Assigns every input its own output file before any worker starts.
///
/// Inputs sharing a stem (`song.wav`, `song.mp3`) keep their extension in
/// the output name. Names are compared case-insensitively; a name that is
/// still taken gets a `_2`, `_3`, ... suffix.
fn plan_outputs(files: &[PathBuf], output_dir: &Path, target_bpm: f64) -> Vec<PathBuf> {
    let lower = |s: Option<&std::ffi::OsStr>| s.map(|s| s.to_string_lossy().to_lowercase()).unwrap_or_default();
    let mut stems: HashMap<String, usize> = HashMap::new();
    for path in files {
        *stems.entry(lower(path.file_stem())).or_default() += 1;
    }

    let mut taken: HashSet<String> = HashSet::new();
    files
        .iter()
        .map(|path| {
            let shared_stem = stems.get(&lower(path.file_stem())).is_some_and(|&n| n > 1);
            let first = if shared_stem {
                output_path_with_extension(path, output_dir, target_bpm)
            } else {
                output_path_for(path, output_dir, target_bpm)
            };
            let base = first.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            let mut output = first;
            let mut n = 2usize;
            while !taken.insert(lower(output.file_name())) {
                output = output_dir.join(format!("{base}_{n}.wav"));
                n += 1;
            }
            output
        })
        .collect()
}

fn process_file(
    analyzer: &mut TempoAnalyzer,
    path: &Path,
    output: Option<&Path>,
    job: &BatchJob,
    config: &PipelineConfig,
) -> FileReport {
    let file = display_name(path);
    let buffer = match load_audio_file(path, &config.loader) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("⚠️ Failed to load {}: {e:#}", path.display());
            return FileReport {
                file,
                current_bpm: None,
                target_bpm: job.target_bpm,
                outcome: FileOutcome::Failed { error: format!("{e:#}") },
            };
        }
    };

    let estimate = analyzer.analyze(&buffer);
    let current_bpm = estimate.is_detected().then(|| estimate.reported_bpm());
    match current_bpm {
        Some(bpm) => log::info!("🎵 {file}: {bpm:.2} BPM"),
        None => log::info!("🎵 {file}: tempo undetectable"),
    }

    let Some(target) = job.target_bpm else {
        return FileReport { file, current_bpm, target_bpm: None, outcome: FileOutcome::Analyzed };
    };

    let Some(output) = output else {
        let outcome = FileOutcome::Failed { error: "no output path assigned".into() };
        return FileReport { file, current_bpm, target_bpm: Some(target), outcome };
    };
    let outcome = match adjust_file(buffer, &estimate, target, output, config) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!("⚠️ Failed to adjust {}: {e:#}", path.display());
            FileOutcome::Failed { error: format!("{e:#}") }
        }
    };
    FileReport { file, current_bpm, target_bpm: Some(target), outcome }
}

fn adjust_file(
    buffer: crate::audio::AudioBuffer,
    estimate: &TempoEstimate,
    target_bpm: f64,
    output: &Path,
    config: &PipelineConfig,
) -> Result<FileOutcome> {
    let request = TempoAdjustmentRequest::new(buffer, estimate.bpm, target_bpm)?;
    match render_at_tempo(request, &config.render)? {
        RenderOutcome::Rendered(rendered) => {
            export_wav(&rendered, output, &config.export)?;
            Ok(FileOutcome::Rendered { output: output.to_path_buf() })
        }
        RenderOutcome::SkippedUndetectable => Ok(FileOutcome::SkippedUndetectable),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
