//! Configuration system for the Argo query server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, database path, model, logging)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values. A missing
//! config.yaml is not an error; defaults apply.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::logging::{LogFormat, LogOutput};

pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Database location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path used when running locally
    pub local_path: PathBuf,

    /// Directory on the hosting platform's persistent disk
    pub persistent_dir: PathBuf,

    /// Use `persistent_dir` instead of `local_path` (set by `RENDER`)
    pub use_persistent: bool,

    /// Explicit path, overriding both of the above
    pub path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            local_path: PathBuf::from("argo_data.db"),
            persistent_dir: PathBuf::from("/var/data"),
            use_persistent: false,
            path: None,
        }
    }
}

impl DatabaseConfig {
    /// Resolve the database file to open.
    pub fn resolve_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            path.clone()
        } else if self.use_persistent {
            self.persistent_dir.join("argo_data.db")
        } else {
            self.local_path.clone()
        }
    }

    /// Resolve the database path, creating the persistent directory when it is in use.
    pub fn prepare_path(&self) -> Result<PathBuf, ConfigError> {
        if self.path.is_none() && self.use_persistent {
            std::fs::create_dir_all(&self.persistent_dir)?;
        }
        Ok(self.resolve_path())
    }
}

/// Language-model endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://openrouter.ai/api/v1".to_string(),
            model: "deepseek/deepseek-chat-v3.1:free".to_string(),
            temperature: 0.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    pub format: LogFormat,

    pub output: LogOutput,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            output: LogOutput::Stdout,
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but falls back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ARGO_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parsed("PORT") {
            self.server.port = port;
        }

        if std::env::var_os("RENDER").is_some() {
            self.database.use_persistent = true;
        }
        if let Ok(path) = std::env::var("ARGO_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(api_base) = std::env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = env_parsed("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(output) = env_parsed("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Get the model service API key from environment (usually via .env)
    pub fn get_api_key() -> Result<String, ConfigError> {
        std::env::var(API_KEY_VAR).map_err(|_| ConfigError::MissingEnvVar(API_KEY_VAR.to_string()))
    }
}

/// `var` parsed as `T`; unset or unparsable values leave the config as it was.
fn env_parsed<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.parse().ok()
}
