//! Auth-gated HTTP request pipeline.
//!
//! Every call reads the session token from the injected [`TokenStore`] and
//! sends it as `Authorization: Bearer <token>`. Non-multipart requests made
//! through [`ApiClient::send`] are preceded by an identity check against
//! `GET /team-roster/me`; the main call is only issued once that check has
//! resolved. Any 401 clears the token store.
//!
//! The pipeline never retries. Retry policy belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;
use super::request::{is_bodyless, RequestBody, RequestDescriptor, RequestOptions};
use super::token::TokenStore;
use super::types::User;
use super::urls::ApiUrls;

/// Identity verification endpoint, also the current-user resource.
pub const VERIFY_ENDPOINT: &str = "/team-roster/me";
pub const ROSTER_ENDPOINT: &str = "/team-roster/";
pub const TRACKER_ITEMS_ENDPOINT: &str = "/jqr/items/";

/// HTTP client wrapper for RT3 API communication.
pub struct ApiClient {
    client: Client,
    urls: ApiUrls,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    /// Create a client with no request timeout.
    pub fn new(urls: ApiUrls, tokens: Arc<dyn TokenStore>) -> Self {
        Self::with_timeout(urls, tokens, None)
    }

    /// Create a client, optionally bounding each HTTP call.
    pub fn with_timeout(
        urls: ApiUrls,
        tokens: Arc<dyn TokenStore>,
        timeout: Option<Duration>,
    ) -> Self {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap_or_else(|e| {
            log::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        });
        Self {
            client,
            urls,
            tokens,
        }
    }

    pub fn urls(&self) -> &ApiUrls {
        &self.urls
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Snapshot of the current token, or `NoToken`.
    fn require_token(&self) -> Result<String, ApiError> {
        self.tokens.get().ok_or(ApiError::NoToken)
    }

    /// Drop the session after the server rejected it.
    fn expire_session(&self) -> ApiError {
        log::warn!("Session token rejected by server, clearing it");
        self.tokens.clear();
        ApiError::AuthExpired
    }

    /// Send a request through the full pipeline and return the decoded body.
    ///
    /// 1. No token: fail with `NoToken`, nothing is sent.
    /// 2. Unless the body is multipart, verify the token first.
    /// 3. Send the request with the bearer header and the encoded body.
    /// 4. Classify the response.
    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<Value, ApiError> {
        let result = self.dispatch(descriptor).await;
        if let Err(ref e) = result {
            log::error!(
                "API request error ({} {}): {}",
                descriptor.options.method,
                descriptor.endpoint,
                e
            );
        }
        result
    }

    /// Shorthand for `send` with a separate endpoint and options.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Value, ApiError> {
        self.send(&RequestDescriptor::new(endpoint, options)).await
    }

    async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<Value, ApiError> {
        let token = self.require_token()?;
        let options = &descriptor.options;

        if !options.is_multipart() {
            self.verify(&token).await?;
        }

        let mut headers = options.headers.clone();
        headers.remove(AUTHORIZATION);

        let mut builder = self
            .client
            .request(options.method.clone(), self.urls.api(&descriptor.endpoint));

        match &options.body {
            None => {
                builder = builder.headers(headers).bearer_auth(&token);
            }
            Some(RequestBody::Multipart(form)) => {
                headers.remove(CONTENT_TYPE);
                builder = builder
                    .headers(headers)
                    .bearer_auth(&token)
                    .multipart(form.to_reqwest()?);
            }
            Some(_) if is_bodyless(&options.method) => {
                log::debug!(
                    "Ignoring body on {} {}",
                    options.method,
                    descriptor.endpoint
                );
                builder = builder.headers(headers).bearer_auth(&token);
            }
            Some(RequestBody::Json(value)) => {
                let text = serde_json::to_string(value)
                    .map_err(|e| ApiError::Encode(e.to_string()))?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                builder = builder.headers(headers).bearer_auth(&token).body(text);
            }
            Some(RequestBody::Text(text)) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                builder = builder
                    .headers(headers)
                    .bearer_auth(&token)
                    .body(text.clone());
            }
        }

        let resp = builder.send().await?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(self.expire_session());
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            log::error!("API error response ({}): {}", status, text);
            let message = if text.is_empty() {
                status_phrase(status).to_string()
            } else {
                text
            };
            return Err(ApiError::RequestFailed(message));
        }

        decode_json(resp).await
    }

    /// Pre-flight identity check. Completes before the main call starts.
    async fn verify(&self, token: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .get(self.urls.api(VERIFY_ENDPOINT))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                log::warn!("Identity verification failed: {}", e);
                ApiError::VerificationFailed
            })?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(self.expire_session()),
            status if status.is_success() => Ok(()),
            status => {
                log::warn!("Identity verification returned {}", status);
                Err(ApiError::VerificationFailed)
            }
        }
    }

    /// Authorized GET without the verification round trip.
    ///
    /// Shares the 401 handling of [`ApiClient::send`]; other failures are
    /// reported with the message built by `failure`.
    pub(crate) async fn authorized_get<T, F>(&self, endpoint: &str, failure: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: FnOnce(StatusCode) -> String,
    {
        let token = self.require_token()?;
        let resp = self
            .client
            .get(self.urls.api(endpoint))
            .bearer_auth(&token)
            .send()
            .await?;
        let resp = self.check_derived(resp, failure)?;
        decode_typed(resp).await
    }

    /// 401 clears the session; any other failure maps through `failure`.
    pub(crate) fn check_derived<F>(&self, resp: Response, failure: F) -> Result<Response, ApiError>
    where
        F: FnOnce(StatusCode) -> String,
    {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(self.expire_session());
        }
        if !status.is_success() {
            return Err(ApiError::RequestFailed(failure(status)));
        }
        Ok(resp)
    }

    /// Fetch the team roster (`GET /team-roster/`).
    pub async fn fetch_roster(&self) -> Result<Vec<User>, ApiError> {
        self.authorized_get(ROSTER_ENDPOINT, |status| {
            format!("API request failed: {}", status_phrase(status))
        })
        .await
    }

    /// Fetch tracker items (`GET /jqr/items/`).
    pub async fn fetch_tracker_items(&self) -> Result<Vec<Value>, ApiError> {
        self.authorized_get(TRACKER_ITEMS_ENDPOINT, |_| {
            "Failed to fetch JQR items".to_string()
        })
        .await
    }

    /// Fetch the current user (`GET /team-roster/me`).
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.authorized_get(VERIFY_ENDPOINT, |_| "Failed to fetch user data".to_string())
            .await
    }

    /// Fetch raw bytes from an absolute URL (used for uploaded images).
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::RequestFailed(format!(
                "Failed to fetch {}: {}",
                url,
                status_phrase(status)
            )));
        }
        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }
}

/// Canonical reason phrase for a status.
pub(crate) fn status_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown status")
}

/// Decode a success body as JSON. An empty body decodes to `null`.
pub(crate) async fn decode_json(resp: Response) -> Result<Value, ApiError> {
    let text = resp.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

pub(crate) async fn decode_typed<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}
