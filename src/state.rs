//! Shared client state.
//!
//! One [`AppState`] per process: the configured token store, the API client
//! built on it, and a navigator for the hooks. Everything is `Arc`-shared so
//! hooks and the realtime channel can hold their own references.

use std::sync::Arc;

use crate::api::client::ApiClient;
use crate::api::token::TokenStore;
use crate::api::types::User;
use crate::config::{ClientConfig, ConfigError};
use crate::hooks::{self, DataHook, Navigator};
use crate::realtime::{self, ChannelHandle, Connector};

pub struct AppState {
    pub config: ClientConfig,

    /// Backing store for the session token.
    pub tokens: Arc<dyn TokenStore>,

    /// HTTP client for the RT3 API.
    pub api: Arc<ApiClient>,

    /// Receives login redirects from hooks.
    pub navigator: Arc<dyn Navigator>,
}

impl AppState {
    /// Open the configured token store and build the client on it.
    pub fn new(config: ClientConfig, navigator: Arc<dyn Navigator>) -> Result<Self, ConfigError> {
        let tokens = config.open_token_store()?;
        Ok(Self::with_tokens(config, tokens, navigator))
    }

    pub fn with_tokens(
        config: ClientConfig,
        tokens: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let api = Arc::new(ApiClient::with_timeout(
            config.urls(),
            tokens.clone(),
            config.request_timeout,
        ));
        Self {
            config,
            tokens,
            api,
            navigator,
        }
    }

    pub fn user_hook(&self) -> DataHook<User> {
        hooks::user_hook(self.api.clone(), self.navigator.clone())
    }

    pub fn operators_hook(&self) -> DataHook<Vec<User>> {
        hooks::operators_hook(self.api.clone(), self.navigator.clone())
    }

    /// Mount the realtime channel. Must be called inside a Tokio runtime.
    pub fn mount_channel(&self, connector: Arc<dyn Connector>) -> ChannelHandle {
        realtime::mount(self.config.channel_config(self.tokens.clone()), connector)
    }
}
