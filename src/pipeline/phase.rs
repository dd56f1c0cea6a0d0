//! Phase notifications broadcast while an order is processed.
//!
//! Each stage of [`OrderPipeline::run_once`] emits a [`PipelineEvent`]
//! through the [`Notifier`], which hands it to every registered
//! [`PhaseObserver`] in registration order.  Observers are best-effort: an
//! error or a panic inside one is caught and logged, and never reaches the
//! pipeline or the other observers.
//!
//! [`OrderPipeline::run_once`]: crate::pipeline::OrderPipeline::run_once

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::fulfillment::DispatchOutcome;
use crate::menu::{Confidence, MenuItem};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Named point of progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    LoadingModel,
    ModelLoaded,
    RecordingStarted,
    RecordingFinished,
    Transcribing,
    Transcribed,
    Recognizing,
    Recognized,
    Serving,
    Served,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::LoadingModel => "loading_model",
            Phase::ModelLoaded => "model_loaded",
            Phase::RecordingStarted => "recording_started",
            Phase::RecordingFinished => "recording_finished",
            Phase::Transcribing => "transcribing",
            Phase::Transcribed => "transcribed",
            Phase::Recognizing => "recognizing",
            Phase::Recognized => "recognized",
            Phase::Serving => "serving",
            Phase::Served => "served",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// A phase together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    LoadingModel,
    ModelLoaded,
    RecordingStarted { seconds: f32, device: String },
    RecordingFinished,
    Transcribing,
    Transcribed { text: String },
    Recognizing,
    Recognized {
        text: String,
        order: MenuItem,
        confidence: Confidence,
    },
    Serving { order: MenuItem },
    Served {
        order: MenuItem,
        outcome: DispatchOutcome,
    },
    Failed { text: String },
}

impl PipelineEvent {
    pub fn phase(&self) -> Phase {
        match self {
            PipelineEvent::LoadingModel => Phase::LoadingModel,
            PipelineEvent::ModelLoaded => Phase::ModelLoaded,
            PipelineEvent::RecordingStarted { .. } => Phase::RecordingStarted,
            PipelineEvent::RecordingFinished => Phase::RecordingFinished,
            PipelineEvent::Transcribing => Phase::Transcribing,
            PipelineEvent::Transcribed { .. } => Phase::Transcribed,
            PipelineEvent::Recognizing => Phase::Recognizing,
            PipelineEvent::Recognized { .. } => Phase::Recognized,
            PipelineEvent::Serving { .. } => Phase::Serving,
            PipelineEvent::Served { .. } => Phase::Served,
            PipelineEvent::Failed { .. } => Phase::Failed,
        }
    }

    /// Keyword payload of the event, in a fixed key order.
    pub fn payload(&self) -> Vec<(&'static str, String)> {
        match self {
            PipelineEvent::RecordingStarted { seconds, device } => vec![
                ("seconds", seconds.to_string()),
                ("device", device.clone()),
            ],
            PipelineEvent::Transcribed { text } | PipelineEvent::Failed { text } => {
                vec![("text", text.clone())]
            }
            PipelineEvent::Recognized {
                text,
                order,
                confidence,
            } => vec![
                ("text", text.clone()),
                ("order", order.to_string()),
                ("confidence", confidence.to_string()),
            ],
            PipelineEvent::Serving { order } => vec![("order", order.to_string())],
            PipelineEvent::Served { order, outcome } => {
                let mut payload = vec![
                    ("order", order.to_string()),
                    ("outcome", outcome.label().to_string()),
                ];
                if let DispatchOutcome::Failed(reason) = outcome {
                    payload.push(("reason", reason.clone()));
                }
                payload
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phase().as_str())?;
        for (key, value) in self.payload() {
            write!(f, " {key}={value:?}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("observer failed: {0}")]
    Failed(String),

    #[error("observer channel closed")]
    Closed,
}

/// Receives phase notifications.  Called synchronously on the pipeline's
/// task, so implementations should return quickly.
pub trait PhaseObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent) -> Result<(), ObserverError>;
}

/// Writes every event to the `log` facade at `info` level.
#[derive(Debug, Default, Clone)]
pub struct LoggingObserver;

impl PhaseObserver for LoggingObserver {
    fn on_event(&self, event: &PipelineEvent) -> Result<(), ObserverError> {
        log::info!("phase: {event}");
        Ok(())
    }
}

/// Forwards events into a bounded tokio channel.  Events are dropped while
/// the channel is full.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<PipelineEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving end of a channel holding `capacity` events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl PhaseObserver for ChannelObserver {
    fn on_event(&self, event: &PipelineEvent) -> Result<(), ObserverError> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                log::debug!("phase: channel full, dropping {}", dropped.phase());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ObserverError::Closed),
        }
    }
}

/// Adapts a closure into an observer.
pub struct FnObserver<F>(F);

impl<F> FnObserver<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> PhaseObserver for FnObserver<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent) -> Result<(), ObserverError> {
        (self.0)(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Fans events out to the registered observers.
#[derive(Default, Clone)]
pub struct Notifier {
    observers: Vec<Arc<dyn PhaseObserver>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn PhaseObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `event` to every observer.  Never fails.
    pub fn notify(&self, event: PipelineEvent) {
        for observer in &self.observers {
            match panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("phase: observer error @ {}: {e}", event.phase());
                }
                Err(_) => {
                    log::warn!("phase: observer panicked @ {}", event.phase());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Keeps every event it sees.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<PipelineEvent>>,
}

#[cfg(test)]
impl RecordingObserver {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events().iter().map(PipelineEvent::phase).collect()
    }
}

#[cfg(test)]
impl PhaseObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) -> Result<(), ObserverError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::Menu;

    struct FailingObserver;

    impl PhaseObserver for FailingObserver {
        fn on_event(&self, _: &PipelineEvent) -> Result<(), ObserverError> {
            Err(ObserverError::Failed("display unavailable".into()))
        }
    }

    struct PanickingObserver;

    impl PhaseObserver for PanickingObserver {
        fn on_event(&self, _: &PipelineEvent) -> Result<(), ObserverError> {
            panic!("observer bug");
        }
    }

    fn tuna() -> MenuItem {
        Menu::new(["tuna"]).unwrap().items()[0].clone()
    }

    #[test]
    fn failing_and_panicking_observers_do_not_block_others() {
        let recorder = Arc::new(RecordingObserver::default());
        let notifier = Notifier::new()
            .with_observer(Arc::new(FailingObserver))
            .with_observer(Arc::new(PanickingObserver))
            .with_observer(recorder.clone());

        notifier.notify(PipelineEvent::LoadingModel);
        notifier.notify(PipelineEvent::ModelLoaded);

        assert_eq!(recorder.phases(), vec![Phase::LoadingModel, Phase::ModelLoaded]);
    }

    #[test]
    fn recognized_payload_keys() {
        let event = PipelineEvent::Recognized {
            text: "tuna please".into(),
            order: tuna(),
            confidence: Confidence::High,
        };
        assert_eq!(
            event.payload(),
            vec![
                ("text", "tuna please".to_string()),
                ("order", "tuna".to_string()),
                ("confidence", "high".to_string()),
            ]
        );
    }

    #[test]
    fn served_payload_carries_outcome() {
        let served = PipelineEvent::Served {
            order: tuna(),
            outcome: DispatchOutcome::Served,
        };
        assert_eq!(served.payload()[1], ("outcome", "served".to_string()));

        let failed = PipelineEvent::Served {
            order: tuna(),
            outcome: DispatchOutcome::Failed("exit status: 1".into()),
        };
        let payload = failed.payload();
        assert_eq!(payload[1], ("outcome", "failed".to_string()));
        assert_eq!(payload[2], ("reason", "exit status: 1".to_string()));
    }

    #[test]
    fn recording_started_payload() {
        let event = PipelineEvent::RecordingStarted {
            seconds: 7.0,
            device: "5".into(),
        };
        assert_eq!(
            event.payload(),
            vec![("seconds", "7".to_string()), ("device", "5".to_string())]
        );
        assert_eq!(event.to_string(), "recording_started seconds=\"7\" device=\"5\"");
    }

    #[test]
    fn channel_observer_drops_when_full() {
        let (observer, mut rx) = ChannelObserver::channel(1);
        observer.on_event(&PipelineEvent::Transcribing).unwrap();
        observer.on_event(&PipelineEvent::Recognizing).unwrap();

        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Transcribing);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_observer_reports_closed_receiver() {
        let (observer, rx) = ChannelObserver::channel(4);
        drop(rx);
        assert!(matches!(
            observer.on_event(&PipelineEvent::Transcribing),
            Err(ObserverError::Closed)
        ));
    }

    #[test]
    fn fn_observer_invokes_closure() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let notifier = Notifier::new().with_observer(Arc::new(FnObserver::new(
            move |e: &PipelineEvent| sink.lock().unwrap().push(e.phase()),
        )));

        notifier.notify(PipelineEvent::Failed { text: String::new() });
        assert_eq!(*seen.lock().unwrap(), vec![Phase::Failed]);
    }

    #[test]
    fn empty_notifier_is_a_no_op() {
        let notifier = Notifier::new();
        assert!(notifier.is_empty());
        notifier.notify(PipelineEvent::LoadingModel);
    }
}
