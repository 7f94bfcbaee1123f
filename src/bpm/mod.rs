pub mod detector;
pub mod onset;
pub mod utils;
pub mod adapter;

pub use detector::{BpmDetector, TempoCandidate, TempoEstimate, TempoOptions, estimate_from_envelope};
pub use onset::{AnalysisMode, OnsetEnvelope, OnsetExtractor, OnsetOptions, onset_envelope};
pub use adapter::analyze_bpm_for_file;

use crate::audio::AudioBuffer;
use crate::config::AnalysisOptions;
use crate::error::Result;

/// Onset extraction and tempo detection bundled for repeated use, e.g. one
/// per batch worker.
pub struct TempoAnalyzer {
    extractor: OnsetExtractor,
    detector: BpmDetector,
}

impl TempoAnalyzer {
    pub fn new(opts: &AnalysisOptions) -> Result<Self> {
        Ok(Self {
            extractor: OnsetExtractor::new(opts.onset.clone())?,
            detector: BpmDetector::new(opts.tempo.clone())?,
        })
    }

    pub fn analyze(&mut self, buffer: &AudioBuffer) -> TempoEstimate {
        let envelope = self.extractor.extract(buffer);
        self.detector.detect(&envelope)
    }
}

/// Estimates the tempo of a whole buffer.
///
/// Errors only on invalid options; a buffer without detectable tempo
/// yields [`TempoEstimate::undetectable`].
pub fn estimate_tempo(buffer: &AudioBuffer, opts: &AnalysisOptions) -> Result<TempoEstimate> {
    Ok(TempoAnalyzer::new(opts)?.analyze(buffer))
}
