//! GGML model naming, on-disk resolution and the once-per-loader engine load.
//!
//! whisper.cpp publishes its GGML conversions in the
//! [`ggerganov/whisper.cpp`](https://huggingface.co/ggerganov/whisper.cpp)
//! hub repository as `ggml-{size}[-{quant}].bin`.  [`ModelPaths`] looks for
//! that file in the models directory first and otherwise downloads it with
//! `hf-hub` into the same directory.  [`WhisperLoader`] turns an
//! [`SttConfig`] into a shared [`SttEngine`] and loads it at most once.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use hf_hub::api::sync::ApiBuilder;

use crate::config::{AppPaths, ComputePrecision, SttConfig, WhisperSize};
use crate::stt::engine::{SttEngine, SttError, WhisperEngine};
use crate::stt::transcribe::TranscribeParams;

/// Hub repository holding the GGML whisper conversions.
pub const WHISPER_REPO: &str = "ggerganov/whisper.cpp";

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

impl WhisperSize {
    /// Model name as used in the GGML file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            WhisperSize::Tiny => "tiny",
            WhisperSize::Base => "base",
            WhisperSize::Small => "small",
            WhisperSize::Medium => "medium",
            WhisperSize::LargeV3 => "large-v3",
        }
    }
}

impl ComputePrecision {
    /// Quantisation suffix for `size`, or `None` for full-precision weights.
    ///
    /// The hub publishes the 5-bit tiny, base and small models as `q5_1`
    /// and the larger ones as `q5_0`.
    pub fn suffix(&self, size: WhisperSize) -> Option<&'static str> {
        match (self, size) {
            (ComputePrecision::F16, _) => None,
            (ComputePrecision::Q8, _) => Some("q8_0"),
            (ComputePrecision::Q5, WhisperSize::Tiny | WhisperSize::Base | WhisperSize::Small) => {
                Some("q5_1")
            }
            (ComputePrecision::Q5, WhisperSize::Medium | WhisperSize::LargeV3) => Some("q5_0"),
        }
    }
}

/// GGML file name for a size/precision pair.
///
/// ```
/// use voice_order::config::{ComputePrecision, WhisperSize};
/// use voice_order::stt::ggml_file_name;
///
/// assert_eq!(ggml_file_name(WhisperSize::Small, ComputePrecision::Q8), "ggml-small-q8_0.bin");
/// assert_eq!(ggml_file_name(WhisperSize::LargeV3, ComputePrecision::F16), "ggml-large-v3.bin");
/// ```
pub fn ggml_file_name(size: WhisperSize, precision: ComputePrecision) -> String {
    match precision.suffix(size) {
        Some(quant) => format!("ggml-{}-{quant}.bin", size.as_str()),
        None => format!("ggml-{}.bin", size.as_str()),
    }
}

// ---------------------------------------------------------------------------
// ModelPaths
// ---------------------------------------------------------------------------

/// Resolves the on-disk location of GGML model files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    /// Directory that contains (or will contain) GGML `.bin` files.
    pub models_dir: PathBuf,
}

impl ModelPaths {
    /// Build a [`ModelPaths`] from the application's [`AppPaths`].
    pub fn from_app_paths(app_paths: &AppPaths) -> Self {
        Self {
            models_dir: app_paths.models_dir.clone(),
        }
    }

    /// Construct directly from a models directory path (useful in tests).
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// `stt.models_dir` when set, otherwise the platform data directory.
    pub fn from_config(config: &SttConfig) -> Self {
        match &config.models_dir {
            Some(dir) => Self::new(dir.clone()),
            None => Self::from_app_paths(&AppPaths::new()),
        }
    }

    /// Path of a manually placed model file.
    pub fn model_path(&self, file_name: &str) -> PathBuf {
        self.models_dir.join(file_name)
    }

    /// Returns `true` if the model file has been placed in the models
    /// directory.
    pub fn is_available(&self, file_name: &str) -> bool {
        self.model_path(file_name).exists()
    }

    /// Return a local path for `file_name`, downloading it from
    /// [`WHISPER_REPO`] when it is not already present.
    ///
    /// Downloads land in the hub cache layout under the models directory, so
    /// a second call finds them without touching the network.
    pub fn ensure(&self, file_name: &str) -> Result<PathBuf, SttError> {
        if self.is_available(file_name) {
            return Ok(self.model_path(file_name));
        }

        log::info!("stt: fetching {file_name} from {WHISPER_REPO}");
        let api = ApiBuilder::new()
            .with_cache_dir(self.models_dir.clone())
            .with_progress(false)
            .build()
            .map_err(|e| SttError::Download(format!("hub client init: {e}")))?;

        api.model(WHISPER_REPO.to_string())
            .get(file_name)
            .map_err(|e| SttError::Download(format!("{file_name}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// SttLoader
// ---------------------------------------------------------------------------

/// Produces the shared STT engine for a run.
pub trait SttLoader: Send + Sync {
    /// Load the engine, or return the one loaded by an earlier call.
    fn load(&self) -> Result<Arc<dyn SttEngine>, SttError>;
}

/// Loads a [`WhisperEngine`] for the configured size and precision.
pub struct WhisperLoader {
    file_name: String,
    paths: ModelPaths,
    params: TranscribeParams,
    loaded: Mutex<Option<Arc<dyn SttEngine>>>,
}

impl WhisperLoader {
    pub fn new(config: &SttConfig, paths: ModelPaths) -> Self {
        Self {
            file_name: ggml_file_name(config.model_size, config.precision),
            paths,
            params: TranscribeParams::from_config(config),
            loaded: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SttConfig) -> Self {
        Self::new(config, ModelPaths::from_config(config))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl SttLoader for WhisperLoader {
    fn load(&self) -> Result<Arc<dyn SttEngine>, SttError> {
        let mut slot = self
            .loaded
            .lock()
            .map_err(|_| SttError::ContextInit("loader lock poisoned".into()))?;

        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let path = self.paths.ensure(&self.file_name)?;
        let engine: Arc<dyn SttEngine> =
            Arc::new(WhisperEngine::load(&path, self.params.clone())?);
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Hands out a fixed engine and counts how often it was asked to.
#[cfg(test)]
pub struct MockSttLoader {
    engine: Result<Arc<dyn SttEngine>, SttError>,
    pub loads: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSttLoader {
    pub fn with_engine(engine: impl SttEngine + 'static) -> Self {
        Self {
            engine: Ok(Arc::new(engine)),
            loads: Default::default(),
        }
    }

    pub fn failing(error: SttError) -> Self {
        Self {
            engine: Err(error),
            loads: Default::default(),
        }
    }
}

#[cfg(test)]
impl SttLoader for MockSttLoader {
    fn load(&self) -> Result<Arc<dyn SttEngine>, SttError> {
        self.loads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.engine.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_cover_every_size() {
        let names: Vec<String> = [
            WhisperSize::Tiny,
            WhisperSize::Base,
            WhisperSize::Small,
            WhisperSize::Medium,
            WhisperSize::LargeV3,
        ]
        .into_iter()
        .map(|s| ggml_file_name(s, ComputePrecision::Q5))
        .collect();

        assert_eq!(
            names,
            vec![
                "ggml-tiny-q5_1.bin",
                "ggml-base-q5_1.bin",
                "ggml-small-q5_1.bin",
                "ggml-medium-q5_0.bin",
                "ggml-large-v3-q5_0.bin",
            ]
        );
    }

    #[test]
    fn small_q5_config_names_the_published_file() {
        let config = SttConfig {
            model_size: WhisperSize::Small,
            precision: ComputePrecision::Q5,
            ..SttConfig::default()
        };
        let loader = WhisperLoader::new(&config, ModelPaths::new("/models"));
        assert_eq!(loader.file_name(), "ggml-small-q5_1.bin");
    }

    #[test]
    fn default_config_selects_small_q8() {
        let loader = WhisperLoader::new(&SttConfig::default(), ModelPaths::new("/models"));
        assert_eq!(loader.file_name(), "ggml-small-q8_0.bin");
    }

    #[test]
    fn model_paths_non_existent_returns_false() {
        let mp = ModelPaths::new("/nonexistent/path");
        assert!(!mp.is_available("ggml-small-q8_0.bin"));
    }

    #[test]
    fn ensure_prefers_a_manually_placed_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ggml-tiny.bin");
        std::fs::write(&file, b"weights").unwrap();

        let mp = ModelPaths::new(dir.path());
        assert_eq!(mp.ensure("ggml-tiny.bin").unwrap(), file);
    }

    #[test]
    fn configured_models_dir_wins() {
        let config = SttConfig {
            models_dir: Some(PathBuf::from("/opt/whisper")),
            ..SttConfig::default()
        };
        assert_eq!(
            ModelPaths::from_config(&config).models_dir,
            PathBuf::from("/opt/whisper")
        );
    }

    #[test]
    fn mock_loader_counts_loads() {
        use crate::stt::engine::MockSttEngine;
        use std::sync::atomic::Ordering;

        let loader = MockSttLoader::with_engine(MockSttEngine::ok("egg"));
        let engine = loader.load().unwrap();
        assert_eq!(engine.transcribe(&[0.0; 16], "en").unwrap(), "egg");
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }
}
