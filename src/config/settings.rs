//! Configuration settings for the rentq server.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llama: LlamaConfig,
    pub huggingface: HuggingFaceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            llama: LlamaConfig::default(),
            huggingface: HuggingFaceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults.
    pub fn load() -> Result<Self> {
        let config_paths = [
            // Current directory
            PathBuf::from("config.toml"),
            PathBuf::from("rentq.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("rentq/config.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".rentq/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Fold the external-collaborator environment variables into the config.
    ///
    /// `RENTQ_DB` overrides the snapshot path, `HF_TOKEN` the inference API
    /// token, and `LLAMA_URL` / `RUNPOD_BASE_URL` the generation endpoint
    /// (`LLAMA_URL` wins when both are set).
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = env_nonempty("RENTQ_DB") {
            self.database.path = path;
        }
        if let Some(url) = env_nonempty("LLAMA_URL").or_else(|| env_nonempty("RUNPOD_BASE_URL")) {
            self.llama.base_url = url;
        }
        if let Some(token) = env_nonempty("HF_TOKEN") {
            self.huggingface.token = Some(token);
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        if self.llama.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("llama.base_url".to_string()).into());
        }
        if self.llama.timeout_secs == 0 {
            return Err(ConfigError::Invalid("llama.timeout_secs must be > 0".to_string()).into());
        }
        if self.huggingface.api_base.trim().is_empty() {
            return Err(ConfigError::MissingField("huggingface.api_base".to_string()).into());
        }
        Ok(())
    }

    /// Path of the SQLite snapshot file.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP port to listen on
    pub port: u16,
    /// Enable permissive CORS for the browser widgets
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            enable_cors: true,
        }
    }
}

/// SQLite snapshot configuration. The file is produced by the offline data
/// pipeline and only ever read here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the snapshot file
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "realestate_v0.5.1.db".to_string(),
        }
    }
}

/// Remote LLaMA generation endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlamaConfig {
    /// Base URL of the generation server (a full `/llama/generate` URL is
    /// also accepted)
    pub base_url: String,
    /// Request timeout in seconds; generation can be slow
    pub timeout_secs: u64,
    /// Token cap applied when the caller sends none
    pub max_new_tokens: u32,
    /// Default sampling temperature
    pub temperature: f32,
    /// Default nucleus sampling threshold
    pub top_p: f32,
}

impl Default for LlamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 120,
            max_new_tokens: 256,
            temperature: 0.2,
            top_p: 0.95,
        }
    }
}

/// Hosted inference API configuration for the NLP task pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HuggingFaceConfig {
    /// Base URL of the hosted-model API
    pub api_base: String,
    /// Bearer token; anonymous calls are allowed but rate-limited
    pub token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Korean extractive Q&A model
    pub qa_model: String,
    /// Star-rating sentiment model
    pub sentiment_model: String,
    /// Grouped-entity NER model
    pub ner_model: String,
    /// Korean-to-English translation model
    pub translation_model: String,
    /// Korean text-generation model
    pub generation_model: String,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api-inference.huggingface.co/models".to_string(),
            token: None,
            timeout_secs: 60,
            qa_model: "monologg/koelectra-base-v3-finetuned-korquad".to_string(),
            sentiment_model: "nlptown/bert-base-multilingual-uncased-sentiment".to_string(),
            ner_model: "dslim/bert-base-NER".to_string(),
            translation_model: "Helsinki-NLP/opus-mt-ko-en".to_string(),
            generation_model: "skt/kogpt2-base-v2".to_string(),
        }
    }
}
