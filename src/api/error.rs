//! Error taxonomy for the request pipeline.
//!
//! The `Display` text of each variant is what data hooks surface as their
//! `error` string, so the wording is part of the contract with the views.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No session token is stored. Raised before any network call.
    #[error("No authentication token found")]
    NoToken,

    /// The server rejected the token. The token store has been cleared.
    #[error("Authentication expired")]
    AuthExpired,

    /// The pre-flight identity check failed for a reason other than 401.
    #[error("Failed to fetch user data")]
    VerificationFailed,

    /// The main call returned a non-success status.
    #[error("{0}")]
    RequestFailed(String),

    /// The main call never produced a response.
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request could not be built locally, no request issued.
    #[error("Failed to encode request: {0}")]
    Encode(String),

    /// A success response whose body could not be decoded.
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// Upload rejected by client-side validation, no request issued.
    #[error("{0}")]
    InvalidUpload(String),
}

impl ApiError {
    /// True when the session is gone and the view should go to login.
    pub fn is_auth_loss(&self) -> bool {
        matches!(self, ApiError::NoToken | ApiError::AuthExpired)
    }
}
