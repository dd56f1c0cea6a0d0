//! Pipeline runner: drives one order from microphone to robot.
//!
//! # Pipeline flow
//!
//! ```text
//! loading_model ─ spawn_blocking(SttLoader::load)             ─▶ model_loaded
//! recording_started ─ spawn_blocking(AudioSource::record)     ─▶ recording_finished
//!   spawn_blocking(resample → 16 kHz)
//! transcribing ─ spawn_blocking(SttEngine::transcribe)        ─▶ transcribed
//! recognizing ─ IntentExtractor::extract_order (async)        ─▶ recognized
//! serving ─ Dispatcher::dispatch (resolve + spawn_blocking)   ─▶ served
//!
//! any failure before `transcribed` ─▶ failed(text = "") and Err(PipelineError)
//! ```
//!
//! Stages run strictly one after another.  [`OrderPipeline::run_once`]
//! takes `&mut self`, so a second run cannot start while one is in flight.

use std::sync::Arc;

use thiserror::Error;

use crate::audio::{resample, AudioError, AudioSource, CaptureError, CpalRecorder};
use crate::config::AppConfig;
use crate::fulfillment::{
    DispatchOutcome, Dispatcher, HfHubStore, ModelCache, ProcessExecutor,
};
use crate::llm::IntentExtractor;
use crate::menu::{Menu, MenuError, RecognitionResult};
use crate::stt::{SttError, SttLoader, WhisperLoader};

use super::phase::{Notifier, PipelineEvent};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Failures that stop a run before an order could be recognized.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("speech model could not be loaded: {0}")]
    ModelLoad(#[source] SttError),

    #[error("audio capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("resampling failed: {0}")]
    Resample(#[from] AudioError),

    #[error("transcription failed: {0}")]
    Transcription(#[source] SttError),

    #[error("internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// PipelineOutcome / RunSettings
// ---------------------------------------------------------------------------

/// What one successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub transcript: String,
    pub recognition: RecognitionResult,
    pub dispatch: DispatchOutcome,
}

/// Per-run recording and transcription parameters.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub record_secs: f32,
    pub target_sample_rate: u32,
    pub language: String,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            record_secs: config.audio.record_secs,
            target_sample_rate: config.audio.target_sample_rate,
            language: config.stt.language.clone(),
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Internal(e.to_string()))
}

// ---------------------------------------------------------------------------
// OrderPipeline
// ---------------------------------------------------------------------------

/// Runs the capture → transcribe → recognize → serve sequence.
pub struct OrderPipeline {
    stt: Arc<dyn SttLoader>,
    source: Arc<dyn AudioSource>,
    extractor: IntentExtractor,
    dispatcher: Dispatcher,
    notifier: Notifier,
    menu: Menu,
    settings: RunSettings,
}

impl OrderPipeline {
    pub fn new(
        stt: Arc<dyn SttLoader>,
        source: Arc<dyn AudioSource>,
        extractor: IntentExtractor,
        dispatcher: Dispatcher,
        notifier: Notifier,
        menu: Menu,
        settings: RunSettings,
    ) -> Self {
        Self {
            stt,
            source,
            extractor,
            dispatcher,
            notifier,
            menu,
            settings,
        }
    }

    /// Wire the production components described by `config`.
    pub fn from_config(config: &AppConfig, notifier: Notifier) -> Result<Self, MenuError> {
        let menu = config.menu.menu()?;
        for item in menu.items() {
            if !config.menu.models.contains_key(item.as_str()) {
                log::warn!("pipeline: menu item '{item}' has no fulfillment model");
            }
        }

        let cache = ModelCache::new(
            config.menu.models.clone(),
            Arc::new(HfHubStore::new()),
            config.models.cache_dir.clone(),
        );
        let dispatcher = Dispatcher::new(
            cache,
            Arc::new(ProcessExecutor::new()),
            config.robot.clone(),
            config.dataset.clone(),
        );

        Ok(Self::new(
            Arc::new(WhisperLoader::from_config(&config.stt)),
            Arc::new(CpalRecorder::new(config.audio.device.clone())),
            IntentExtractor::from_config(&config.llm),
            dispatcher,
            notifier,
            menu,
            RunSettings::from_config(config),
        ))
    }

    pub fn menu(&self) -> &Menu {
        &self.menu
    }

    fn fail(&self, error: PipelineError) -> PipelineError {
        log::error!("pipeline: {error}");
        self.notifier.notify(PipelineEvent::Failed {
            text: String::new(),
        });
        error
    }

    /// Process one spoken order end to end.
    ///
    /// # Errors
    ///
    /// Model loading, capture, resampling and transcription failures end the
    /// run (after a `failed` notification).  Recognition and dispatch never
    /// fail; their problems are reported inside the returned outcome.
    pub async fn run_once(&mut self) -> Result<PipelineOutcome, PipelineError> {
        // ── 1. Speech model ──────────────────────────────────────────────
        self.notifier.notify(PipelineEvent::LoadingModel);
        let loader = Arc::clone(&self.stt);
        let engine = match blocking(move || loader.load()).await {
            Ok(Ok(engine)) => engine,
            Ok(Err(e)) => return Err(self.fail(PipelineError::ModelLoad(e))),
            Err(e) => return Err(self.fail(e)),
        };
        self.notifier.notify(PipelineEvent::ModelLoaded);

        // ── 2. Record ────────────────────────────────────────────────────
        let seconds = self.settings.record_secs;
        self.notifier.notify(PipelineEvent::RecordingStarted {
            seconds,
            device: self.source.device_label(),
        });
        let source = Arc::clone(&self.source);
        let clip = match blocking(move || source.record(seconds)).await {
            Ok(Ok(clip)) => clip,
            Ok(Err(e)) => return Err(self.fail(e.into())),
            Err(e) => return Err(self.fail(e)),
        };
        log::debug!(
            "pipeline: captured {:.2}s at {} Hz",
            clip.duration_secs(),
            clip.sample_rate()
        );
        self.notifier.notify(PipelineEvent::RecordingFinished);

        // ── 3. Resample ──────────────────────────────────────────────────
        let rate = self.settings.target_sample_rate;
        let clip = match blocking(move || resample(clip, rate)).await {
            Ok(Ok(clip)) => clip,
            Ok(Err(e)) => return Err(self.fail(e.into())),
            Err(e) => return Err(self.fail(e)),
        };

        // ── 4. Transcribe ────────────────────────────────────────────────
        self.notifier.notify(PipelineEvent::Transcribing);
        let language = self.settings.language.clone();
        let transcript = match blocking(move || engine.transcribe(clip.samples(), &language)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(self.fail(PipelineError::Transcription(e))),
            Err(e) => return Err(self.fail(e)),
        };
        log::info!("pipeline: transcript {transcript:?}");
        self.notifier.notify(PipelineEvent::Transcribed {
            text: transcript.clone(),
        });

        // ── 5. Recognize ─────────────────────────────────────────────────
        self.notifier.notify(PipelineEvent::Recognizing);
        let recognition = self.extractor.extract_order(&transcript, &self.menu).await;
        log::info!(
            "pipeline: order '{}' (confidence {})",
            recognition.order,
            recognition.confidence
        );
        self.notifier.notify(PipelineEvent::Recognized {
            text: transcript.clone(),
            order: recognition.order.clone(),
            confidence: recognition.confidence,
        });

        // ── 6. Serve ─────────────────────────────────────────────────────
        self.notifier.notify(PipelineEvent::Serving {
            order: recognition.order.clone(),
        });
        let dispatch = self.dispatcher.dispatch(&recognition.order).await;
        self.notifier.notify(PipelineEvent::Served {
            order: recognition.order.clone(),
            outcome: dispatch.clone(),
        });

        Ok(PipelineOutcome {
            transcript,
            recognition,
            dispatch,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
