//! Audio front-end: fixed-duration capture → mono downmix → resampling → VAD.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → CpalRecorder::record → AudioBuffer (native rate, mono)
//!           → resample(buffer, 16_000) → VadFilter::retain_voice → STT
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voice_order::audio::{resample, AudioSource, CpalRecorder};
//!
//! let recorder = CpalRecorder::new(None);
//! let clip = recorder.record(7.0).unwrap();
//! let clip = resample(clip, 16_000).unwrap();
//! println!("{} samples @ {}Hz", clip.samples().len(), clip.sample_rate());
//! ```

pub mod buffer;
pub mod capture;
pub mod resample;
pub mod vad;

pub use buffer::{AudioBuffer, AudioError};
pub use capture::{AudioSource, CaptureError, CpalRecorder};
pub use resample::{downmix_to_mono, output_frames, resample};
pub use vad::VadFilter;

#[cfg(test)]
pub use capture::MockAudioSource;
