//! Client data-access layer for the RT3 team-management service.
//!
//! - [`api`]: token storage, the auth-gated request pipeline, session and
//!   upload operations.
//! - [`realtime`]: the self-healing push channel.
//! - [`hooks`]: `{data, loading, error, refetch}` hooks and form state.

pub mod api;
pub mod config;
pub mod hooks;
pub mod realtime;
pub mod state;

pub use api::{ApiClient, ApiError, ApiUrls, TokenStore};
pub use config::ClientConfig;
pub use state::AppState;
