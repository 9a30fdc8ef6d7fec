use directories::{BaseDirs, ProjectDirs};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::api::models::CurrentUser;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config directory available")]
    NoConfigDir,
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn default_conversation_poll() -> u64 {
    10
}

fn default_message_poll() -> u64 {
    5
}

fn default_notice() -> u64 {
    5
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_conversation_poll")]
    pub conversation_poll_secs: u64,
    #[serde(default = "default_message_poll")]
    pub message_poll_secs: u64,
    #[serde(default = "default_notice")]
    pub filtered_notice_secs: u64,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub user: Option<CurrentUser>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            conversation_poll_secs: default_conversation_poll(),
            message_poll_secs: default_message_poll(),
            filtered_notice_secs: default_notice(),
            request_timeout_secs: default_timeout(),
            user: None,
        }
    }
}

impl AppConfig {
    // TOML is the primary format; a JSON file from older builds is migrated on first load.
    pub fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("marketplace-chat.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = ProjectDirs::from("com", "example", "MarketplaceChat")?;
        Some(proj.config_dir().join("state.json"))
    }

    /// Loads the user's config, falling back to defaults when nothing usable exists.
    pub fn load() -> Self {
        if let Some(path) = Self::toml_path() {
            match Self::load_from(&path) {
                Ok(cfg) => return cfg,
                Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("ignoring {}: {e}", path.display()),
            }
        }

        if let Some(legacy) = Self::legacy_json_path() {
            if let Ok(bytes) = fs::read(&legacy) {
                if let Ok(cfg) = serde_json::from_slice::<AppConfig>(&bytes) {
                    debug!("migrating legacy config from {}", legacy.display());
                    if let Err(e) = cfg.save() {
                        warn!("could not migrate legacy config: {e}");
                    }
                    return cfg;
                }
            }
        }

        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::toml_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && self.user.is_some()
    }

    pub fn conversation_poll(&self) -> Duration {
        Duration::from_secs(self.conversation_poll_secs.max(1))
    }

    pub fn message_poll(&self) -> Duration {
        Duration::from_secs(self.message_poll_secs.max(1))
    }

    pub fn filtered_notice(&self) -> Duration {
        Duration::from_secs(self.filtered_notice_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
