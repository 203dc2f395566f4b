//! Login, logout and session checks.

use reqwest::StatusCode;

use super::client::{decode_typed, ApiClient, VERIFY_ENDPOINT};
use super::error::ApiError;
use super::types::{LoginRequest, LoginResponse, User};

pub const LOGIN_ENDPOINT: &str = "/team-roster/login";

/// Exchange credentials for a session token and store it.
///
/// POST /team-roster/login with a form-urlencoded body. On success the
/// token is written to the token store and the current user is returned.
pub async fn login(client: &ApiClient, username: &str, password: &str) -> Result<User, ApiError> {
    log::info!("Logging in as {}", username);

    let resp = client
        .http()
        .post(client.urls().api(LOGIN_ENDPOINT))
        .form(&LoginRequest { username, password })
        .send()
        .await?;

    if !resp.status().is_success() {
        log::warn!("Login rejected ({})", resp.status());
        return Err(ApiError::RequestFailed("Login failed".to_string()));
    }

    let login_resp: LoginResponse = decode_typed(resp).await?;
    client
        .tokens()
        .set(&login_resp.access_token)
        .map_err(|e| ApiError::RequestFailed(format!("Failed to store session: {}", e)))?;

    let user = client.current_user().await?;
    log::info!("Login complete for {}", user.handle().unwrap_or(username));
    Ok(user)
}

/// Forget the session locally.
pub fn logout(client: &ApiClient) {
    client.tokens().clear();
    log::info!("Logged out");
}

/// Whether the stored token is still accepted by the server.
///
/// Never fails: no token, a rejected token and network errors all yield
/// `false`. A rejected token is cleared.
pub async fn check_auth(client: &ApiClient) -> bool {
    let token = match client.tokens().get() {
        Some(token) => token,
        None => return false,
    };

    let resp = match client
        .http()
        .get(client.urls().api(VERIFY_ENDPOINT))
        .bearer_auth(&token)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            log::error!("Error fetching user: {}", e);
            return false;
        }
    };

    match resp.status() {
        StatusCode::UNAUTHORIZED => {
            client.tokens().clear();
            false
        }
        status if status.is_success() => true,
        status => {
            log::error!("Failed to fetch user data: {}", status);
            false
        }
    }
}
