//! Configuration (layered: code > env > config file > defaults).

pub mod streaming;

pub use streaming::{
    get_max_messages, get_streaming_config, get_streaming_endpoint, get_streaming_timeout,
    streaming_config_for, EndpointMode, RetryConfig, StreamingConfig, StreamingMode,
};

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::error::Result;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// On-disk client configuration (`caeli.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfigFile {
    pub base_url: Option<String>,
    pub storage_dir: Option<PathBuf>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Default)]
struct Settings {
    base_url: Option<String>,
    storage_dir: Option<PathBuf>,
    auth_token: Option<String>,
}

/// Client-side settings shared by the driver, storage and CLI.
///
/// Values set explicitly win over the environment, which wins over a
/// config file, which wins over built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    settings: Arc<RwLock<Settings>>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `CAELI_API_BASE_URL`, `CAELI_STORAGE_DIR` and `CAELI_AUTH_TOKEN`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let config = Self::new();
        config.apply_env();
        config
    }

    /// Load a TOML file, then overlay the environment on top.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let file: ClientConfigFile = toml::from_str(&raw)?;
        let config = Self::from_file(file);
        let _ = dotenvy::dotenv();
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(file: ClientConfigFile) -> Self {
        Self {
            settings: Arc::new(RwLock::new(Settings {
                base_url: file.base_url,
                storage_dir: file.storage_dir,
                auth_token: file.auth_token,
            })),
        }
    }

    fn apply_env(&self) {
        if let Ok(url) = std::env::var("CAELI_API_BASE_URL") {
            self.set_base_url(url);
        }
        if let Ok(dir) = std::env::var("CAELI_STORAGE_DIR") {
            self.set_storage_dir(PathBuf::from(dir));
        }
        if let Ok(token) = std::env::var("CAELI_AUTH_TOKEN") {
            self.set_auth_token(token);
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Settings> {
        self.settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Settings> {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_base_url(&self, url: impl Into<String>) {
        self.write().base_url = Some(url.into());
    }

    pub fn base_url(&self) -> String {
        self.read()
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn set_storage_dir(&self, dir: PathBuf) {
        self.write().storage_dir = Some(dir);
    }

    /// Directory for [`crate::storage::FileStore`], if one was configured.
    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.read().storage_dir.clone()
    }

    pub fn set_auth_token(&self, token: impl Into<String>) {
        self.write().auth_token = Some(token.into());
    }

    pub fn auth_token(&self) -> Option<String> {
        self.read().auth_token.clone()
    }

    /// Absolute URL for a streaming endpoint.
    pub fn endpoint_url(&self, mode: EndpointMode) -> String {
        let base = self.base_url();
        format!(
            "{}{}",
            base.trim_end_matches('/'),
            get_streaming_endpoint(mode)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_defaults_to_localhost() {
        let config = ClientConfig::new();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn endpoint_url_joins_without_double_slash() {
        let config = ClientConfig::new();
        config.set_base_url("https://caeli.example/");
        assert_eq!(
            config.endpoint_url(EndpointMode::Assistant),
            "https://caeli.example/api/v1/assistant/chat/stream"
        );
    }

    #[test]
    fn explicit_setter_overrides_file_value() {
        let config = ClientConfig::from_file(ClientConfigFile {
            base_url: Some("http://from-file".to_string()),
            ..Default::default()
        });
        assert_eq!(config.base_url(), "http://from-file");
        config.set_base_url("http://explicit");
        assert_eq!(config.base_url(), "http://explicit");
    }

    #[test]
    fn clones_share_settings() {
        let config = ClientConfig::new();
        let other = config.clone();
        other.set_auth_token("tok");
        assert_eq!(config.auth_token().as_deref(), Some("tok"));
    }
}
