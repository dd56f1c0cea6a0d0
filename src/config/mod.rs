//! Configuration module for the voice ordering pipeline.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each pipeline
//! stage, `AppPaths` for cross-platform data directories, and TOML
//! persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, CameraConfig, CameraSource, ComputePrecision, DatasetConfig,
    LlmConfig, LlmProvider, MenuConfig, ModelCacheConfig, RobotConfig, SttConfig, WhisperSize,
};
