//! Endpoint URL construction from the configured origin.
//!
//! The REST API lives under `<origin>/api`, the push channel at `<origin>/ws`
//! (with a `ws`/`wss` scheme) and uploaded files under `<origin>/uploads`.

/// URL builder bound to a single origin, e.g. `https://rt3.example.org`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUrls {
    origin: String,
}

impl ApiUrls {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Absolute URL for an API endpoint.
    ///
    /// A missing leading slash is added and a trailing slash is dropped, so
    /// `/team-roster/` and `team-roster` both map to `<origin>/api/team-roster`.
    pub fn api(&self, endpoint: &str) -> String {
        let mut path = leading_slash(endpoint);
        if path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        format!("{}/api{}", self.origin, path)
    }

    /// Push channel URL, with the origin scheme mapped to `ws`/`wss`.
    pub fn ws(&self) -> String {
        let origin = if let Some(rest) = self.origin.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.origin.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.origin.clone()
        };
        format!("{}/ws", origin)
    }

    /// Push channel URL carrying the session token as a query parameter.
    pub fn ws_with_token(&self, token: Option<&str>) -> String {
        match token {
            Some(t) => format!("{}?token={}", self.ws(), urlencoding::encode(t)),
            None => self.ws(),
        }
    }

    /// Absolute URL for a path under the uploads directory.
    pub fn uploads(&self, path: &str) -> String {
        format!("{}/uploads{}", self.origin, leading_slash(path))
    }

    /// `<origin>/uploads/<owner-handle>/<filename>`, or `None` when either
    /// part is empty.
    pub fn avatar(&self, owner_handle: &str, filename: &str) -> Option<String> {
        if owner_handle.is_empty() || filename.is_empty() {
            return None;
        }
        Some(self.uploads(&format!(
            "/{}/{}",
            urlencoding::encode(owner_handle),
            urlencoding::encode(filename)
        )))
    }
}

/// Normalize an image path returned by the API into an origin-relative path.
///
/// Strips a leading `/uploads` and any `http(s)://host` prefix and ensures
/// the result starts with `/`. Returns an empty string for an empty input.
pub fn direct_image_path(path: &str) -> String {
    if path.is_empty() {
        log::warn!("direct_image_path called with empty path");
        return String::new();
    }
    let path = path.strip_prefix("/uploads").unwrap_or(path);
    let path = strip_scheme_and_host(path);
    leading_slash(path)
}

fn strip_scheme_and_host(path: &str) -> &str {
    let rest = match path
        .strip_prefix("http://")
        .or_else(|| path.strip_prefix("https://"))
    {
        Some(rest) => rest,
        None => return path,
    };
    if rest.is_empty() || rest.starts_with('/') {
        return path;
    }
    match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "",
    }
}

fn leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
