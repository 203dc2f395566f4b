//! Tracker uploads and image operations.
//!
//! Uploads are multipart and skip the identity check. Image files are
//! validated locally before any request is built.

use std::str::FromStr;

use reqwest::Method;
use serde_json::Value;

use super::client::{decode_json, status_phrase, ApiClient};
use super::error::ApiError;
use super::request::{MultipartForm, RequestDescriptor, RequestOptions};
use super::types::{ImageUploadResponse, User};
use super::urls::{direct_image_path, ApiUrls};

pub const TRACKER_UPLOAD_ENDPOINT: &str = "/jqr/tracker/";

/// Largest accepted image (10 MiB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Upload a tracker item (`POST /jqr/tracker/`, multipart).
pub async fn upload_tracker_item(client: &ApiClient, form: &MultipartForm) -> Result<Value, ApiError> {
    let token = client.tokens().get().ok_or(ApiError::NoToken)?;
    let resp = client
        .http()
        .post(client.urls().api(TRACKER_UPLOAD_ENDPOINT))
        .bearer_auth(&token)
        .multipart(form.to_reqwest()?)
        .send()
        .await?;
    let resp = client.check_derived(resp, |status| {
        format!("File upload failed: {}", status_phrase(status))
    })?;
    decode_json(resp).await
}

/// Which image slot an upload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Dashboard,
    Avatar,
}

impl ImageKind {
    fn upload_endpoint(self) -> &'static str {
        match self {
            ImageKind::Dashboard => "/images/dashboard/upload",
            ImageKind::Avatar => "/team-roster/me/avatar/upload",
        }
    }
}

impl FromStr for ImageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dashboard" => Ok(ImageKind::Dashboard),
            "avatar" => Ok(ImageKind::Avatar),
            other => Err(format!("unknown image kind: {}", other)),
        }
    }
}

/// An image file selected for upload.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub mime: String,
    pub data: Vec<u8>,
}

impl ImageFile {
    /// Reject non-image types and files over [`MAX_IMAGE_BYTES`].
    pub fn validate(&self) -> Result<(), ApiError> {
        if !self.mime.starts_with("image/") {
            return Err(ApiError::InvalidUpload("Please upload an image file".to_string()));
        }
        if self.data.len() > MAX_IMAGE_BYTES {
            return Err(ApiError::InvalidUpload(
                "File size must be less than 10MB".to_string(),
            ));
        }
        Ok(())
    }
}

/// Upload a dashboard image or the current user's avatar.
pub async fn upload_image(
    client: &ApiClient,
    kind: ImageKind,
    file: &ImageFile,
) -> Result<ImageUploadResponse, ApiError> {
    file.validate()?;

    let form = MultipartForm::new().file("file", &file.file_name, &file.mime, file.data.clone());
    let descriptor = RequestDescriptor::new(
        kind.upload_endpoint(),
        RequestOptions::new(Method::POST).multipart(form),
    );
    let body = client.send(&descriptor).await?;
    parse_upload_response(kind, body)
}

fn parse_upload_response(kind: ImageKind, body: Value) -> Result<ImageUploadResponse, ApiError> {
    // Avatar endpoints may answer with the bare filename.
    if let (ImageKind::Avatar, Value::String(filename)) = (kind, &body) {
        return Ok(ImageUploadResponse {
            id: None,
            direct_url: None,
            filename: Some(filename.clone()),
        });
    }

    let parsed: ImageUploadResponse = serde_json::from_value(body)
        .map_err(|_| ApiError::RequestFailed("Invalid response from server".to_string()))?;

    match kind {
        ImageKind::Dashboard if parsed.id.is_none() || parsed.direct_url.is_none() => {
            Err(ApiError::RequestFailed("Invalid response from server".to_string()))
        }
        ImageKind::Avatar if parsed.direct_url.is_none() && parsed.filename.is_none() => {
            Err(ApiError::RequestFailed("Invalid avatar response format".to_string()))
        }
        _ => Ok(parsed),
    }
}

/// Delete a dashboard image (identified by its URL) or the current avatar.
pub async fn delete_image(
    client: &ApiClient,
    kind: ImageKind,
    current_url: Option<&str>,
) -> Result<(), ApiError> {
    let endpoint = match kind {
        ImageKind::Dashboard => {
            let url = current_url
                .filter(|u| !u.is_empty())
                .ok_or_else(|| ApiError::InvalidUpload("No image URL found".to_string()))?;
            let id = image_id_from_url(url).ok_or_else(|| {
                ApiError::InvalidUpload("Could not extract image ID from URL".to_string())
            })?;
            format!("/images/{}", id)
        }
        ImageKind::Avatar => "/team-roster/me/avatar".to_string(),
    };
    client.send(&RequestDescriptor::delete(&endpoint)).await?;
    Ok(())
}

/// File stem of the last path segment: `/uploads/dash/42.png` -> `42`.
fn image_id_from_url(url: &str) -> Option<&str> {
    let last = url.rsplit('/').next()?;
    let stem = last.split('.').next()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Public URL of a user's avatar, if they have one.
pub fn avatar_url(urls: &ApiUrls, user: &User) -> Option<String> {
    urls.avatar(user.handle()?, user.avatar_filename()?)
}

/// Download an uploaded image given either an absolute URL or an API path.
pub async fn fetch_image(client: &ApiClient, path: &str) -> Result<Vec<u8>, ApiError> {
    let url = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        client.urls().uploads(&direct_image_path(path))
    };
    client.get_bytes(&url).await
}
