//! STT (Speech-to-Text) engine module.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 SttLoader (trait)                    │
//! │   ┌──────────────┐      ┌──────────────┐             │
//! │   │  ModelPaths  │      │WhisperEngine │             │
//! │   │ - local file │─────▶│ - ctx        │             │
//! │   │ - hub fetch  │      │ - VadFilter  │             │
//! │   └──────────────┘      └──────┬───────┘             │
//! │                                ▼                     │
//! │                  SttEngine::transcribe()             │
//! │                  16 kHz audio + language → text      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_order::config::SttConfig;
//! use voice_order::stt::{SttLoader, WhisperLoader};
//!
//! let loader = WhisperLoader::from_config(&SttConfig::default());
//! let engine = loader.load().expect("model download failed");
//!
//! let audio: Vec<f32> = vec![0.0; 16_000]; // 1 s of silence
//! assert_eq!(engine.transcribe(&audio, "en").unwrap(), "");
//! ```

pub mod engine;
pub mod model;
pub mod transcribe;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{SttEngine, SttError, WhisperEngine};
pub use model::{ggml_file_name, ModelPaths, SttLoader, WhisperLoader, WHISPER_REPO};
pub use transcribe::{SamplingStrategy, Segment, TranscribeParams, TranscriptionResult};

#[cfg(test)]
pub use engine::MockSttEngine;
#[cfg(test)]
pub use model::MockSttLoader;
