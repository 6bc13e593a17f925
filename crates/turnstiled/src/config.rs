//! Daemon configuration: optional TOML file with `TURNSTILE_*` env overrides.
//!
//! The file is named by `TURNSTILE_CONFIG` (or `turnstiled.toml` in the
//! working directory, if present); environment variables win over the file,
//! and built-in defaults fill the rest.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "turnstiled.toml";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8777";
pub const DEFAULT_REGISTRY_PATH: &str = "resources/registry.json";
pub const DEFAULT_HISTORY_DIR: &str = "history";
pub const DEFAULT_MODEL_DIR: &str = "models";
pub const DEFAULT_TOLERANCE: f32 = 0.7;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config {path} is invalid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("tolerance {0} is not a positive finite number")]
    InvalidTolerance(f32),
}

/// Raw on-disk shape; every field optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    pub listen_addr: Option<String>,
    pub registry_path: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub tolerance: Option<f32>,
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: String,
    /// JSON identity registry (ID → reference photo / position).
    pub registry_path: PathBuf,
    /// Root of the evidence archive.
    pub history_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Distance threshold for a positive match; larger admits more matches.
    pub tolerance: f32,
}

impl Config {
    /// Load the config file (if any), apply env overrides, validate.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("TURNSTILE_CONFIG") {
            Ok(path) => ConfigFile::from_path(Path::new(&path))?,
            Err(_) => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    ConfigFile::from_path(default)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        let mut config = Self::from_raw(file);
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Resolve a raw file against built-in defaults.
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            listen_addr: raw
                .listen_addr
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            registry_path: raw
                .registry_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_PATH)),
            history_dir: raw
                .history_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_DIR)),
            model_dir: raw
                .model_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
            tolerance: raw.tolerance.unwrap_or(DEFAULT_TOLERANCE),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("TURNSTILE_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Ok(v) = std::env::var("TURNSTILE_REGISTRY_PATH") {
            self.registry_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TURNSTILE_HISTORY_DIR") {
            self.history_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TURNSTILE_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = std::env::var("TURNSTILE_TOLERANCE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.tolerance = v;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}
