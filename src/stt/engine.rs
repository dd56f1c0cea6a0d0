//! Core STT engine trait and implementations.
//!
//! # Overview
//!
//! [`SttEngine`] is the public interface used by the pipeline.  It is
//! object-safe and `Send + Sync` so it can be held behind an `Arc<dyn SttEngine>`.
//!
//! [`WhisperEngine`] is the production implementation that wraps a
//! `whisper_rs::WhisperContext`.  Every call first runs the clip through a
//! [`VadFilter`]; when nothing voiced is left the engine returns an empty
//! transcript without running inference.
//!
//! [`MockSttEngine`] (available under `#[cfg(test)]`) returns a
//! pre-configured response and records the language it was asked for.

use std::path::Path;

use thiserror::Error;
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

use crate::audio::VadFilter;
use crate::stt::transcribe::{
    join_segments, SamplingStrategy, Segment, TranscribeParams, TranscriptionResult,
};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// All errors that can arise from the STT subsystem.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// The GGML model file was not found at the given path.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The model file could not be fetched from the hub.
    #[error("Model download failed: {0}")]
    Download(String),

    /// `whisper_rs` failed to initialise a `WhisperContext` or `WhisperState`.
    #[error("Whisper context initialisation failed: {0}")]
    ContextInit(String),

    /// An error occurred during the inference pass.
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// The supplied audio buffer exceeds the maximum 60 s
    /// (960 000 samples at 16 kHz).
    #[error("Audio too long: maximum 60 s (960 000 samples at 16 kHz)")]
    AudioTooLong,
}

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for speech-to-text engines.
///
/// # Contract
///
/// - `audio` must be **16 kHz, mono, f32** PCM samples.
/// - `language` is an ISO-639-1 code, or `"auto"` for detection.
/// - A clip with no voiced frames yields `Ok(String::new())`.
/// - Returns `Err(SttError::AudioTooLong)` when `audio.len() > 960_000`.
pub trait SttEngine: Send + Sync {
    /// Transcribe `audio` and return the text transcript.
    fn transcribe(&self, audio: &[f32], language: &str) -> Result<String, SttError>;
}

// Compile-time assertion: Box<dyn SttEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SttEngine>) {}
};

// ---------------------------------------------------------------------------
// Audio length constants (16 kHz mono f32)
// ---------------------------------------------------------------------------

/// Maximum audio length: 60 s × 16 000 Hz = 960 000 samples.
const MAX_AUDIO_SAMPLES: usize = 960_000;

/// whisper.cpp skips inputs shorter than one second, so voiced audio is
/// zero-padded up to this length (1.1 s).
const MIN_INFERENCE_SAMPLES: usize = 17_600;

/// Voiced audio is padded to at least [`MIN_INFERENCE_SAMPLES`].
fn pad_for_inference(mut voiced: Vec<f32>) -> Vec<f32> {
    if voiced.len() < MIN_INFERENCE_SAMPLES {
        voiced.resize(MIN_INFERENCE_SAMPLES, 0.0);
    }
    voiced
}

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

/// Production STT engine that wraps a `whisper_rs::WhisperContext`.
///
/// A new `WhisperState` is created for every [`transcribe`] call so the
/// engine can be shared across threads without any locking.
///
/// [`transcribe`]: WhisperEngine::transcribe
pub struct WhisperEngine {
    ctx: WhisperContext,
    params: TranscribeParams,
    vad: VadFilter,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
// weights are read-only after loading.
unsafe impl Send for WhisperEngine {}
unsafe impl Sync for WhisperEngine {}

impl WhisperEngine {
    /// Load a GGML model from `model_path` and prepare it for inference.
    ///
    /// # Errors
    ///
    /// - [`SttError::ModelNotFound`]: `model_path` does not exist.
    /// - [`SttError::ContextInit`]: whisper-rs failed to load the file.
    pub fn load(
        model_path: impl AsRef<Path>,
        params: TranscribeParams,
    ) -> Result<Self, SttError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(params.use_gpu);
        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        log::info!("stt: loaded whisper model {}", path.display());

        Ok(Self {
            ctx,
            vad: VadFilter::new(params.vad_threshold),
            params,
        })
    }

    /// Transcribe `audio` and return a [`TranscriptionResult`] with
    /// per-segment timing information.
    ///
    /// Prefer [`SttEngine::transcribe`] when only the text is needed.
    pub fn transcribe_full(
        &self,
        audio: &[f32],
        language: &str,
    ) -> Result<TranscriptionResult, SttError> {
        if audio.len() > MAX_AUDIO_SAMPLES {
            return Err(SttError::AudioTooLong);
        }

        let voiced = self.vad.retain_voice(audio);
        log::debug!(
            "stt: vad kept {} of {} samples",
            voiced.len(),
            audio.len()
        );
        if voiced.is_empty() {
            return Ok(TranscriptionResult::default());
        }
        let voiced = pad_for_inference(voiced);

        // ── Build FullParams ──────────────────────────────────────────────
        use whisper_rs::SamplingStrategy as WS;
        let ws = match self.params.strategy {
            SamplingStrategy::Greedy { best_of } => WS::Greedy { best_of },
            SamplingStrategy::BeamSearch { beam_size, patience } => {
                WS::BeamSearch { beam_size, patience }
            }
        };

        let mut fp = FullParams::new(ws);

        let lang: Option<&str> = if language == "auto" {
            None
        } else {
            Some(language)
        };
        fp.set_language(lang);
        fp.set_n_threads(self.params.n_threads);

        if self.params.suppress_progress {
            fp.set_print_special(false);
            fp.set_print_progress(false);
            fp.set_print_realtime(false);
            fp.set_print_timestamps(false);
        }

        // ── Create per-call state and run inference ───────────────────────
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let wall_start = std::time::Instant::now();

        state
            .full(fp, &voiced)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        // ── Collect segments ──────────────────────────────────────────────
        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut segments: Vec<Segment> = Vec::with_capacity(n_segments.max(0) as usize);

        for i in 0..n_segments {
            let seg_text = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;

            // Timestamps are in centiseconds → multiply by 10 for ms.
            let t0 = state.full_get_segment_t0(i).unwrap_or(0).max(0) as u64 * 10;
            let t1 = state.full_get_segment_t1(i).unwrap_or(0).max(0) as u64 * 10;

            segments.push(Segment {
                text: seg_text,
                start_ms: t0,
                end_ms: t1,
            });
        }

        Ok(TranscriptionResult {
            text: join_segments(segments.iter().map(|s| s.text.as_str())),
            segments,
            duration_ms: wall_start.elapsed().as_millis(),
        })
    }
}

impl SttEngine for WhisperEngine {
    fn transcribe(&self, audio: &[f32], language: &str) -> Result<String, SttError> {
        self.transcribe_full(audio, language).map(|r| r.text)
    }
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

/// A test double that returns a pre-configured response without loading any
/// model file.
#[cfg(test)]
pub struct MockSttEngine {
    response: Result<String, SttError>,
    languages: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockSttEngine {
    /// Create a mock that always returns `Ok(text)`.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            languages: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns `Err(error)`.
    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            languages: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Languages passed to every call so far, in order.
    pub fn languages(&self) -> Vec<String> {
        self.languages.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl SttEngine for MockSttEngine {
    fn transcribe(&self, audio: &[f32], language: &str) -> Result<String, SttError> {
        self.languages.lock().unwrap().push(language.to_string());
        if audio.len() > MAX_AUDIO_SAMPLES {
            return Err(SttError::AudioTooLong);
        }
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // --- MockSttEngine ---

    #[test]
    fn mock_ok_returns_configured_text_and_records_language() {
        let engine = MockSttEngine::ok("one tuna please");
        let audio = vec![0.0f32; 16_000];
        assert_eq!(engine.transcribe(&audio, "en").unwrap(), "one tuna please");
        assert_eq!(engine.languages(), vec!["en".to_string()]);
    }

    #[test]
    fn mock_err_returns_configured_error() {
        let engine = MockSttEngine::err(SttError::Transcription("boom".into()));
        let err = engine.transcribe(&[0.0f32; 160], "en").unwrap_err();
        assert!(matches!(err, SttError::Transcription(_)));
    }

    #[test]
    fn mock_long_audio_returns_audio_too_long() {
        let engine = MockSttEngine::ok("text");
        let long = vec![0.0f32; MAX_AUDIO_SAMPLES + 1];
        let err = engine.transcribe(&long, "en").unwrap_err();
        assert!(matches!(err, SttError::AudioTooLong));
    }

    // --- WhisperEngine::load missing path ---

    #[test]
    fn load_missing_model_returns_model_not_found() {
        let result = WhisperEngine::load("/nonexistent/model.bin", TranscribeParams::default());
        assert!(
            matches!(result, Err(SttError::ModelNotFound(_))),
            "expected ModelNotFound, got: {result:?}"
        );
    }

    // --- padding ---

    #[test]
    fn short_voice_is_padded_to_inference_minimum() {
        let padded = pad_for_inference(vec![0.5; 4_800]);
        assert_eq!(padded.len(), MIN_INFERENCE_SAMPLES);
        assert!(padded[..4_800].iter().all(|&s| s == 0.5));
        assert!(padded[4_800..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn long_voice_is_not_padded() {
        let voice = vec![0.5; MIN_INFERENCE_SAMPLES + 10];
        assert_eq!(pad_for_inference(voice.clone()), voice);
    }

    // --- SttEngine object safety ---

    #[test]
    fn box_dyn_stt_engine_compiles() {
        let engine: Box<dyn SttEngine> = Box::new(MockSttEngine::ok("ok"));
        let _ = engine.transcribe(&[0.0f32; 16], "auto");
    }

    // --- SttError display ---

    #[test]
    fn stt_error_display_model_not_found() {
        let e = SttError::ModelNotFound("/some/path.bin".into());
        assert!(e.to_string().contains("/some/path.bin"));
    }

    #[test]
    fn stt_error_display_audio_too_long() {
        assert!(SttError::AudioTooLong.to_string().contains("long"));
    }
}
