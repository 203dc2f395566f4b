//! Wire types for the RT3 API.
//!
//! Only the fields needed to route and label requests are typed; everything
//! else is carried through untouched in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Avatar reference attached to a roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Avatar {
    pub filename: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Roster entry, as returned by `GET /team-roster/me` and `GET /team-roster/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    /// Absent or `null` for operators that never picked a handle.
    #[serde(default)]
    pub operator_handle: Option<String>,
    pub team_role: Option<String>,
    pub avatar: Option<Avatar>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Admin roles carry `ADMIN` somewhere in the role name.
    pub fn is_admin(&self) -> bool {
        self.team_role
            .as_deref()
            .is_some_and(|role| role.contains("ADMIN"))
    }

    pub fn handle(&self) -> Option<&str> {
        self.operator_handle.as_deref()
    }

    pub fn avatar_filename(&self) -> Option<&str> {
        self.avatar
            .as_ref()
            .and_then(|a| a.filename.as_deref())
            .filter(|f| !f.is_empty())
    }
}

/// Form body sent to `POST /team-roster/login`.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Response from `POST /team-roster/login`.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: Option<String>,
}

/// Response from the image upload endpoints.
///
/// Dashboard uploads return `id` and `direct_url`; avatar uploads return
/// either `direct_url` or a bare `filename`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUploadResponse {
    pub id: Option<Value>,
    pub direct_url: Option<String>,
    pub filename: Option<String>,
}
