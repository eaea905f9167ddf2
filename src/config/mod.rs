// Configuration module
// Centralized management of application configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::models::SpeechFormat;
use crate::utils::common::is_safe_file_name;

/// Env variable pointing at an optional JSON config file
pub const CONFIG_PATH_ENV: &str = "VOCARISE_CONFIG";

const DEFAULT_MODEL_URL: &str = "https://github.com/coqui-ai/TTS/releases/download/v0.10.1_models/tts_models--multilingual--multi-dataset--your_tts.zip";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root for uploads, outputs and the model bundle
    pub storage_root: PathBuf,
    /// Prefix for returned `audio_url`s. Relative URLs when unset.
    pub public_base_url: Option<String>,
    pub frontend_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// 0 disables the per-request timeout
    pub request_timeout_secs: u64,
    pub model: ModelConfig,
    pub audio: AudioConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            storage_root: PathBuf::from("data"),
            public_base_url: None,
            frontend_dir: PathBuf::from("frontend"),
            max_upload_bytes: 25 * 1024 * 1024,
            request_timeout_secs: 300,
            model: ModelConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

/// Voice model source, layout and runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Archive location: http(s) URL, file:// URL or local path
    pub source_url: String,
    /// Directory name of the extracted bundle under `<storage_root>/models`
    pub dir_name: String,
    pub config_file: String,
    pub weights_file: String,
    /// Language code passed to the engine
    pub language: String,
    /// Synthesis runtime executable (Coqui `tts` CLI)
    pub engine_program: String,
    pub use_cuda: bool,
    pub max_concurrent_synthesis: usize,
    pub download_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_MODEL_URL.to_string(),
            dir_name: "tts_models--multilingual--multi-dataset--your_tts".to_string(),
            config_file: "config.json".to_string(),
            weights_file: "model_file.pth".to_string(),
            language: "fr-fr".to_string(),
            engine_program: "tts".to_string(),
            use_cuda: false,
            max_concurrent_synthesis: 1,
            download_timeout_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub reference_sample_rate: u32,
    /// Peak level of the normalized reference, in dBFS
    pub target_peak_dbfs: f32,
    pub trailing_silence_ms: u32,
    pub delivery_format: SpeechFormat,
    pub ffmpeg_program: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            reference_sample_rate: 16000,
            target_peak_dbfs: -0.1,
            trailing_silence_ms: 1000,
            delivery_format: SpeechFormat::Mp3,
            ffmpeg_program: "ffmpeg".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the JSON file named by `VOCARISE_CONFIG` (if any), then applies env overrides.
    pub fn load() -> AppResult<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            AppError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Environment overrides. `PORT` is honoured as-is for PaaS deployments.
    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| AppError::Configuration(format!("Invalid PORT: {}", port)))?;
        }
        if let Some(host) = lookup("VOCARISE_HOST") {
            self.host = host;
        }
        if let Some(root) = lookup("VOCARISE_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(root);
        }
        if let Some(url) = lookup("VOCARISE_PUBLIC_BASE_URL") {
            self.public_base_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(dir) = lookup("VOCARISE_FRONTEND_DIR") {
            self.frontend_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("VOCARISE_MODEL_URL") {
            self.model.source_url = url;
        }
        if let Some(language) = lookup("VOCARISE_LANGUAGE") {
            self.model.language = language;
        }
        if let Some(program) = lookup("VOCARISE_TTS_PROGRAM") {
            self.model.engine_program = program;
        }
        if let Some(flag) = lookup("VOCARISE_USE_CUDA") {
            self.model.use_cuda = matches!(flag.trim(), "1" | "true" | "yes");
        }
        if let Some(program) = lookup("VOCARISE_FFMPEG") {
            self.audio.ffmpeg_program = program;
        }
        if let Some(format) = lookup("VOCARISE_DELIVERY_FORMAT") {
            self.audio.delivery_format = SpeechFormat::from_extension(format.trim()).ok_or_else(|| {
                AppError::Configuration(format!("Unsupported delivery format: {}", format))
            })?;
        }
        if let Some(secs) = lookup("VOCARISE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs.trim().parse().map_err(|_| {
                AppError::Configuration(format!("Invalid request timeout: {}", secs))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.model.source_url.trim().is_empty() {
            return Err(AppError::Configuration("model source URL is empty".to_string()));
        }
        if self.model.language.trim().is_empty() {
            return Err(AppError::Configuration("model language is empty".to_string()));
        }
        for name in [&self.model.dir_name, &self.model.config_file, &self.model.weights_file] {
            if !is_safe_file_name(name) {
                return Err(AppError::Configuration(format!("Invalid model file name: {}", name)));
            }
        }
        if self.model.max_concurrent_synthesis == 0 {
            return Err(AppError::Configuration(
                "max_concurrent_synthesis must be at least 1".to_string(),
            ));
        }
        if self.audio.reference_sample_rate == 0 {
            return Err(AppError::Configuration("reference sample rate must be positive".to_string()));
        }
        if self.audio.target_peak_dbfs > 0.0 {
            return Err(AppError::Configuration("target peak must be at or below 0 dBFS".to_string()));
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.storage_root.join("uploads")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.storage_root.join("outputs")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.storage_root.join("models")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.models_dir().join(&self.model.dir_name)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Creates the storage directories. The model directory itself is left to provisioning.
    pub async fn prepare_dirs(&self) -> AppResult<()> {
        for dir in [self.uploads_dir(), self.outputs_dir(), self.models_dir()] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                AppError::Configuration(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn audio_url(&self, name: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/api/audio/{}", base.trim_end_matches('/'), name),
            None => format!("/api/audio/{}", name),
        }
    }
}
