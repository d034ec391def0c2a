//! Configuration system
//!
//! Two configuration layers with different lifetimes:
//! - [`AppConfig`]: local ambient settings (logging, log paths) loaded from an
//!   optional TOML file with environment variable overrides
//! - [`RemoteConfig`]: the payload answered by the background collaborator's
//!   `getConfig` request, validated once per page load and frozen into a
//!   [`ModelCatalog`]

use crate::models::{ModelCatalog, DEFAULT_MODEL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

/// Local configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "ERROR".to_string(),
                format: "pretty".to_string(),
                output: "console".to_string(),
            },
            paths: PathsConfig {
                log_directory: PathBuf::from("logs"),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = AppConfig::default();

        let config_paths = [
            PathBuf::from("usage-overlay.toml"),
            PathBuf::from(".usage-overlay.toml"),
            dirs::config_dir()
                .map(|d| d.join("usage-overlay").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }
        if let Ok(val) = env::var("USAGE_OVERLAY_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }
    }
}

/// Global configuration instance
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global configuration instance
pub fn get_config() -> &'static AppConfig {
    CONFIG.get_or_init(|| AppConfig::load().unwrap_or_default())
}

/// Page selectors supplied by the collaborator. The engine treats these as
/// opaque query strings for the host page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selectors {
    #[serde(rename = "MODEL_OVERRIDE")]
    pub model_override: String,
    #[serde(rename = "MODEL_PICKER")]
    pub model_picker: String,
    #[serde(rename = "USER_MENU_BUTTON")]
    pub user_menu_button: String,
}

/// Configuration answered by the background collaborator's `getConfig`
/// request. Loaded once per page load, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(rename = "MODELS")]
    pub models: Vec<String>,
    #[serde(rename = "MODEL_TOKEN_CAPS")]
    pub model_token_caps: std::collections::HashMap<String, u64>,
    #[serde(rename = "SELECTORS")]
    pub selectors: Selectors,
    #[serde(rename = "WARNING_THRESHOLD")]
    pub warning_threshold: f64,
    #[serde(rename = "UI_UPDATE_INTERVAL_MS")]
    pub ui_update_interval_ms: u64,
}

impl RemoteConfig {
    /// Validate the collaborator-supplied values before the engine commits to
    /// them for the page lifetime.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            anyhow::bail!("Remote config lists no models");
        }
        if !self.model_token_caps.contains_key(DEFAULT_MODEL) {
            anyhow::bail!("Remote config is missing the '{DEFAULT_MODEL}' token cap");
        }
        if !(self.warning_threshold > 0.0 && self.warning_threshold <= 1.0) {
            anyhow::bail!(
                "Warning threshold must be in (0, 1], got {}",
                self.warning_threshold
            );
        }
        if self.ui_update_interval_ms == 0 {
            anyhow::bail!("UI update interval must be greater than 0");
        }
        Ok(())
    }

    /// Freeze the model list and caps into the page-lifetime catalog.
    pub fn catalog(&self) -> ModelCatalog {
        ModelCatalog::new(self.models.clone(), self.model_token_caps.clone())
    }
}
