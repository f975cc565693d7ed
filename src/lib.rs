pub mod api;
pub mod deadline;
pub mod error;
pub mod event;
pub mod gate;
pub mod headers;
pub mod logging;
pub mod payload;
pub mod receiver;
pub mod signature;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use error::{GateError, Result};
use receiver::EventReceiver;

pub const DEFAULT_WEBHOOK_PATH: &str = "/api/github/webhooks";

#[derive(Debug, Deserialize, Clone)]
pub struct GateConfig {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secret: String,
    /// Also accepted while rotating secrets.
    #[serde(default)]
    pub additional_secrets: Vec<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    pub log: Option<LogConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub directory: PathBuf,
}

fn default_path() -> String {
    DEFAULT_WEBHOOK_PATH.to_string()
}

fn default_max_body_bytes() -> usize {
    payload::DEFAULT_MAX_BODY_BYTES
}

impl GateConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            path: default_path(),
            secret: secret.into(),
            additional_secrets: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
            log: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Primary secret first, then the rotation secrets.
    pub fn secrets(&self) -> Vec<&str> {
        std::iter::once(self.secret.as_str())
            .chain(self.additional_secrets.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns an error if the config cannot serve deliveries.
    pub fn validate(&self) -> Result<()> {
        if self.secret.trim().is_empty() {
            return Err(GateError::ConfigError("secret required".to_string()));
        }
        if !self.path.starts_with('/') {
            return Err(GateError::ConfigError(format!(
                "path must start with '/': {:?}",
                self.path
            )));
        }
        Ok(())
    }
}

/// Parse a TOML configuration string
pub fn parse_config(config_str: &str) -> Result<GateConfig> {
    let config: GateConfig = toml::from_str(config_str)?;
    Ok(config)
}

/// Load and parse the configuration file
pub fn load_config(path: &Path) -> Result<GateConfig> {
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        GateError::ConfigError(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    parse_config(&config_str).map_err(|e| {
        GateError::ConfigError(format!("Failed to parse config file '{}': {}", path.display(), e))
    })
}

pub struct AppState {
    pub config: GateConfig,
    pub receiver: EventReceiver,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: GateConfig, receiver: EventReceiver) -> Self {
        Self {
            config,
            receiver,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
