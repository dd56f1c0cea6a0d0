//! Order pipeline: one spoken order from microphone to fulfillment.
//!
//! # Architecture
//!
//! ```text
//! OrderPipeline::run_once()  ← async, &mut self
//!        │
//!        ├─ spawn_blocking(SttLoader::load)           loading_model / model_loaded
//!        ├─ spawn_blocking(AudioSource::record)       recording_started / recording_finished
//!        ├─ spawn_blocking(resample → 16 kHz)
//!        ├─ spawn_blocking(SttEngine::transcribe)     transcribing / transcribed
//!        ├─ IntentExtractor::extract_order            recognizing / recognized
//!        └─ Dispatcher::dispatch                      serving / served
//!
//! Notifier ──▶ PhaseObserver (LoggingObserver, ChannelObserver, FnObserver)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_order::config::AppConfig;
//! use voice_order::pipeline::{LoggingObserver, Notifier, OrderPipeline};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::load().unwrap();
//!     let notifier = Notifier::new().with_observer(Arc::new(LoggingObserver));
//!     let mut pipeline = OrderPipeline::from_config(&config, notifier).unwrap();
//!
//!     match pipeline.run_once().await {
//!         Ok(outcome) => println!("{} → {}", outcome.recognition.order, outcome.dispatch),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

pub mod phase;
pub mod runner;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use phase::{
    ChannelObserver, FnObserver, LoggingObserver, Notifier, ObserverError, Phase, PhaseObserver,
    PipelineEvent,
};
pub use runner::{OrderPipeline, PipelineError, PipelineOutcome, RunSettings};
