//! Application entry point for voice ordering.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the [`OrderPipeline`] from config with a [`LoggingObserver`].
//! 5. Run one invocation: record, transcribe, recognize, serve.

use std::sync::Arc;

use anyhow::Context;
use voice_order::{
    config::AppConfig,
    pipeline::{LoggingObserver, Notifier, OrderPipeline},
};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice-order starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    // 4. Pipeline
    let notifier = Notifier::new().with_observer(Arc::new(LoggingObserver));
    let mut pipeline =
        OrderPipeline::from_config(&config, notifier).context("invalid menu configuration")?;
    log::info!(
        "menu: {}",
        pipeline
            .menu()
            .items()
            .iter()
            .map(|i| i.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // 5. One order
    let outcome = rt.block_on(pipeline.run_once())?;

    if outcome.dispatch.is_served() {
        log::info!(
            "order '{}' (confidence {}) served",
            outcome.recognition.order,
            outcome.recognition.confidence
        );
    } else {
        log::warn!(
            "order '{}' (confidence {}) not served: {}",
            outcome.recognition.order,
            outcome.recognition.confidence,
            outcome.dispatch
        );
    }
    Ok(())
}
