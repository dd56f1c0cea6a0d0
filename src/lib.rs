//! Voice ordering: record a spoken order, transcribe it with whisper, map it
//! onto a fixed menu with a generative-language service and hand the result
//! to a robot fulfillment command.

pub mod audio;
pub mod config;
pub mod fulfillment;
pub mod llm;
pub mod menu;
pub mod pipeline;
pub mod stt;
