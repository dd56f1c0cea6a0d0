//! Order recognition through a generative-language service.
//!
//! This module provides:
//! * [`GenerativeClient`]: async trait for "prompt in, text out" services,
//!   with [`GeminiClient`] and [`OpenAiClient`] implementations.
//! * [`OrderPromptBuilder`]: deterministic menu + transcript prompt.
//! * [`strip_code_fence`] / [`parse_reply`]: reply parsing.
//! * [`IntentExtractor`]: the never-failing `extract_order` entry point,
//!   backed by the pure [`decide`] fallback function.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_order::config::AppConfig;
//! use voice_order::llm::IntentExtractor;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let menu = config.menu.menu().unwrap();
//!
//!     let extractor = IntentExtractor::from_config(&config.llm);
//!     let result = extractor.extract_order("one tuna please", &menu).await;
//!     println!("{} ({})", result.order, result.confidence);
//! }
//! ```

pub mod client;
pub mod extractor;
pub mod prompt;
pub mod response;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{client_from_config, GeminiClient, GenerativeClient, LlmError, OpenAiClient};
pub use extractor::{decide, DegradedReason, Extraction, IntentExtractor};
pub use prompt::OrderPromptBuilder;
pub use response::{parse_reply, strip_code_fence, ParsedReply};

#[cfg(test)]
pub use extractor::ScriptedClient;
