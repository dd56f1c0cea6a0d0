//! Transcription parameter types and result types.
//!
//! [`TranscribeParams`] carries the engine-wide settings that control every
//! whisper inference run; the language is supplied per call.
//! [`TranscriptionResult`] is returned by [`WhisperEngine::transcribe_full`].
//!
//! [`WhisperEngine::transcribe_full`]: crate::stt::WhisperEngine::transcribe_full

use crate::config::SttConfig;

// ---------------------------------------------------------------------------
// SamplingStrategy
// ---------------------------------------------------------------------------

/// Mirrors `whisper_rs::SamplingStrategy` but is owned and `Clone`.
///
/// Greedy decoding is plenty for single-phrase orders against a short menu;
/// [`SamplingStrategy::BeamSearch`] trades 2-4× latency for accuracy.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    /// Greedy (single-pass) decoding.
    Greedy {
        /// Number of candidate tokens evaluated per step.  1 is fastest.
        best_of: i32,
    },
    /// Beam-search decoding.
    BeamSearch {
        /// Number of beams to maintain in parallel.
        beam_size: i32,
        /// Beam-search patience factor (≥1.0 = standard beam search).
        patience: f32,
    },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Greedy { best_of: 1 }
    }
}

// ---------------------------------------------------------------------------
// TranscribeParams
// ---------------------------------------------------------------------------

/// Engine-wide parameters for whisper inference.
///
/// ```
/// use voice_order::stt::TranscribeParams;
///
/// let params = TranscribeParams {
///     vad_threshold: 0.02,
///     ..TranscribeParams::default()
/// };
/// assert!(params.n_threads >= 1);
/// ```
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// Decoding strategy.
    pub strategy: SamplingStrategy,

    /// Number of CPU threads handed to whisper.  Defaults to
    /// [`optimal_threads()`], capped at 8.
    pub n_threads: i32,

    /// Suppress whisper's progress output to stderr.
    pub suppress_progress: bool,

    /// RMS threshold for the voice-activity filter applied before inference.
    pub vad_threshold: f32,

    /// Ask whisper.cpp to offload to the GPU when it was built with support.
    pub use_gpu: bool,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::default(),
            n_threads: optimal_threads(),
            suppress_progress: true,
            vad_threshold: 0.01,
            use_gpu: false,
        }
    }
}

impl TranscribeParams {
    pub fn from_config(config: &SttConfig) -> Self {
        let strategy = match config.beam_size {
            0 | 1 => SamplingStrategy::default(),
            n => SamplingStrategy::BeamSearch {
                beam_size: n.min(i32::MAX as u32) as i32,
                patience: 1.0,
            },
        };
        Self {
            strategy,
            vad_threshold: config.vad_threshold,
            use_gpu: config.use_gpu,
            ..Self::default()
        }
    }
}

/// Returns the number of CPU threads to use for inference, capped at 8.
pub(crate) fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// The output of a successful transcription.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionResult {
    /// Segment texts concatenated in order with no separator, then trimmed.
    pub text: String,

    /// Individual time-aligned segments produced by whisper.
    pub segments: Vec<Segment>,

    /// Wall-clock time the inference took, in milliseconds.
    pub duration_ms: u128,
}

/// A single time-aligned text chunk produced by whisper.
#[derive(Debug, Clone)]
pub struct Segment {
    pub text: String,
    /// Start time in milliseconds from the start of the voiced audio.
    pub start_ms: u64,
    /// End time in milliseconds from the start of the voiced audio.
    pub end_ms: u64,
}

/// Join segment texts in order with no separator and trim the result.
pub fn join_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let joined: String = segments.into_iter().collect();
    joined.trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
