//! Inbound push-channel messages.
//!
//! Messages are JSON text discriminated by a `type` field. Unknown types are
//! accepted and ignored so new server events never break old clients.

use serde::Deserialize;
use serde_json::Value;

use super::ChannelError;

/// Server error text that revokes the channel for the current session.
pub const UNAUTHORIZED: &str = "Unauthorized";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A new image was uploaded; `image` is the image record.
    ImageUploaded { image: Value },
    /// Server-side error report.
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, ChannelError> {
        Ok(serde_json::from_str(text)?)
    }

    /// True for the server's "your session is not allowed here" error.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ServerMessage::Error { message: Some(m) } if m == UNAUTHORIZED)
    }
}
