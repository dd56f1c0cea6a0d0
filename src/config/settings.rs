//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to each
//! pipeline component at construction time.  Nothing here is mutated once a
//! pipeline has been built.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::menu::{Menu, MenuError};

// ---------------------------------------------------------------------------
// MenuConfig
// ---------------------------------------------------------------------------

/// The fixed menu and the fulfillment model registered for each item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuConfig {
    /// Menu items in presentation order.
    pub items: Vec<String>,
    /// Menu item → remote model repository id (e.g. `"user/ServeTunaSushi"`).
    pub models: BTreeMap<String, String>,
}

impl MenuConfig {
    /// Validate `items` into an immutable [`Menu`].
    pub fn menu(&self) -> Result<Menu, MenuError> {
        Menu::new(self.items.iter().cloned())
    }
}

impl Default for MenuConfig {
    fn default() -> Self {
        let models = [
            ("egg", "your_hf_username/ServeEggSushi"),
            ("tuna", "your_hf_username/ServeTunaSushi"),
            ("cucumber roll", "your_hf_username/ServeCucumberRoll"),
            ("tempura (fried shrimp)", "your_hf_username/ServeTempuraSushi"),
        ];
        Self {
            items: models.iter().map(|(item, _)| item.to_string()).collect(),
            models: models
                .iter()
                .map(|(item, repo)| (item.to_string(), repo.to_string()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// LlmProvider / LlmConfig
// ---------------------------------------------------------------------------

/// Wire format spoken by the generative-language service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    /// Google Gemini `generateContent` REST API.
    Gemini,
    /// Any OpenAI-compatible `/v1/chat/completions` endpoint.
    OpenAiCompatible,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::Gemini
    }
}

/// Settings for the order-recognition step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which wire format to use.
    pub provider: LlmProvider,
    /// Base URL of the API endpoint.
    ///
    /// - Gemini: `https://generativelanguage.googleapis.com`
    /// - OpenAI: `https://api.openai.com`
    pub base_url: String,
    /// API key.  When `None`, the variable named by `api_key_env` is used.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is not set.
    pub api_key_env: String,
    /// Model identifier sent to the API (e.g. `"gemini-2.5-flash"`).
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Maximum seconds to wait for a response before timing out.
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// The credential to authenticate with, if any is configured.
    ///
    /// Blank values count as "not configured".
    pub fn credential(&self) -> Option<String> {
        let from_config = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        from_config.or_else(|| {
            std::env::var(&self.api_key_env)
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        })
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".into(),
            model: "gemini-2.5-flash".into(),
            temperature: 0.0,
            timeout_secs: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Capacity tier of the whisper model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WhisperSize {
    Tiny,
    Base,
    Small,
    Medium,
    LargeV3,
}

/// Weight precision of the GGML model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputePrecision {
    /// Full half-precision weights.
    #[serde(rename = "f16")]
    F16,
    /// 8-bit quantised weights (recommended on CPU).
    #[serde(rename = "q8_0")]
    Q8,
    /// 5-bit quantised weights (`q5_1` or `q5_0`, whichever the size ships).
    #[serde(rename = "q5", alias = "q5_0", alias = "q5_1")]
    Q5,
}

/// Settings for the whisper STT engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Model capacity tier.
    pub model_size: WhisperSize,
    /// Weight precision of the downloaded model.
    pub precision: ComputePrecision,
    /// Speech language as an ISO-639-1 code, or `"auto"` for whisper's
    /// built-in language detection.
    pub language: String,
    /// Attempt GPU-accelerated inference when available.
    pub use_gpu: bool,
    /// RMS level below which a 30 ms frame counts as silence and is dropped
    /// before inference.
    pub vad_threshold: f32,
    /// Beam width for decoding.  1 selects greedy decoding.
    pub beam_size: u32,
    /// Override for the directory holding GGML files.
    pub models_dir: Option<PathBuf>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_size: WhisperSize::Small,
            precision: ComputePrecision::Q8,
            language: "en".into(),
            use_gpu: false,
            vad_threshold: 0.01,
            beam_size: 1,
            models_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for fixed-duration audio capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device, either its name or its index among the host's input
    /// devices.  `None` means the system default.
    pub device: Option<String>,
    /// Recording length in seconds.
    pub record_secs: f32,
    /// Sample rate handed to the STT engine (whisper needs 16 000).
    pub target_sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            record_secs: 7.0,
            target_sample_rate: 16_000,
        }
    }
}

// ---------------------------------------------------------------------------
// RobotConfig
// ---------------------------------------------------------------------------

/// Where a camera's frames come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CameraSource {
    Index(u32),
    Path(String),
}

/// Capture parameters for one logical camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Capture backend, e.g. `"opencv"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub index_or_path: CameraSource,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CameraConfig {
    fn opencv(index: u32) -> Self {
        Self {
            kind: "opencv".into(),
            index_or_path: CameraSource::Index(index),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Connection parameters for the serving robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Robot driver type passed to the executor.
    pub robot_type: String,
    /// Serial port / connection identifier.
    pub port: String,
    /// Calibration id of the robot.
    pub id: String,
    /// Logical camera name → capture parameters.
    pub cameras: BTreeMap<String, CameraConfig>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        let mut cameras = BTreeMap::new();
        cameras.insert("top".to_string(), CameraConfig::opencv(8));
        cameras.insert("wrist".to_string(), CameraConfig::opencv(10));
        Self {
            robot_type: "so101_follower".into(),
            port: "/dev/ttyACM2".into(),
            id: "my_awsome_follower_arm".into(),
            cameras,
        }
    }
}

// ---------------------------------------------------------------------------
// DatasetConfig
// ---------------------------------------------------------------------------

/// Parameters of the evaluation dataset recorded while serving.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Executable invoked to perform fulfillment.
    pub executable: String,
    /// Hub namespace prefixed to dataset ids.
    pub namespace: String,
    /// Dataset root.  `None` means `./eval_lerobot_dataset`.
    pub run_root: Option<PathBuf>,
    /// Task description; `{order}` is replaced by the order name.
    pub task_template: String,
    pub episode_time_s: u32,
    pub num_episodes: u32,
    pub display_data: bool,
    pub push_to_hub: bool,
}

impl DatasetConfig {
    /// Effective dataset root directory.
    pub fn run_root(&self) -> PathBuf {
        self.run_root.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("eval_lerobot_dataset")
        })
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            executable: "lerobot-record".into(),
            namespace: "your_hf_username".into(),
            run_root: None,
            task_template: "Serve {order} sushi".into(),
            episode_time_s: 20,
            num_episodes: 1,
            display_data: true,
            push_to_hub: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelCacheConfig
// ---------------------------------------------------------------------------

/// Where fulfillment models are cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCacheConfig {
    /// Cache root.  `None` uses the shared Hugging Face cache.
    pub cache_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_order::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub menu: MenuConfig,
    pub llm: LlmConfig,
    pub stt: SttConfig,
    pub audio: AudioConfig,
    pub robot: RobotConfig,
    pub dataset: DatasetConfig,
    pub models: ModelCacheConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
