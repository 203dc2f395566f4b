//! Runtime configuration from environment variables.
//!
//! `main` loads `.env` with dotenvy first; CLI flags are applied on top.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::api::token::{FileTokenStore, MemoryTokenStore, TokenStore};
use crate::api::urls::ApiUrls;
use crate::realtime::{ChannelConfig, RECONNECT_DELAY};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown token backend: {0} (expected file, keychain or memory)")]
    UnknownBackend(String),

    #[error("{var} must be a whole number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },

    #[error("Keychain token storage is not available in this build")]
    KeychainUnavailable,
}

/// Where the session token is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenBackend {
    #[default]
    File,
    Keychain,
    Memory,
}

impl FromStr for TokenBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(TokenBackend::File),
            "keychain" => Ok(TokenBackend::Keychain),
            "memory" => Ok(TokenBackend::Memory),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Server origin; the API lives under `<origin>/api`.
    pub api_url: String,
    pub reconnect_delay: Duration,
    /// No timeout unless configured.
    pub request_timeout: Option<Duration>,
    pub token_backend: TokenBackend,
    /// Overrides [`FileTokenStore::default_path`].
    pub token_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            reconnect_delay: RECONNECT_DELAY,
            request_timeout: None,
            token_backend: TokenBackend::default(),
            token_file: None,
        }
    }
}

impl ClientConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        // RT3_API_URL > API_URL > localhost default
        if let Some(url) = get("RT3_API_URL").or_else(|| get("API_URL")) {
            config.api_url = url;
        }
        if let Some(value) = get("RT3_RECONNECT_DELAY_SECS") {
            config.reconnect_delay = parse_seconds("RT3_RECONNECT_DELAY_SECS", &value)?;
        }
        if let Some(value) = get("RT3_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Some(parse_seconds("RT3_REQUEST_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = get("RT3_TOKEN_BACKEND") {
            config.token_backend = value.parse()?;
        }
        config.token_file = get("RT3_TOKEN_FILE").map(PathBuf::from);

        Ok(config)
    }

    pub fn urls(&self) -> ApiUrls {
        ApiUrls::new(&self.api_url)
    }

    /// Open the configured token backend.
    pub fn open_token_store(&self) -> Result<Arc<dyn TokenStore>, ConfigError> {
        match self.token_backend {
            TokenBackend::File => {
                let path = self
                    .token_file
                    .clone()
                    .unwrap_or_else(FileTokenStore::default_path);
                log::debug!("Using token file {}", path.display());
                Ok(Arc::new(FileTokenStore::new(path)))
            }
            TokenBackend::Memory => Ok(Arc::new(MemoryTokenStore::new())),
            #[cfg(feature = "keychain")]
            TokenBackend::Keychain => Ok(Arc::new(crate::api::token::KeychainTokenStore::new())),
            #[cfg(not(feature = "keychain"))]
            TokenBackend::Keychain => Err(ConfigError::KeychainUnavailable),
        }
    }

    pub fn channel_config(&self, tokens: Arc<dyn TokenStore>) -> ChannelConfig {
        ChannelConfig::new(self.urls(), tokens).with_reconnect_delay(self.reconnect_delay)
    }
}

fn parse_seconds(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidSeconds {
            var,
            value: value.to_string(),
        })
}
