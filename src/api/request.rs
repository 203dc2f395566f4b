//! Request descriptors and body encodings for the request pipeline.
//!
//! A body is exactly one of: structured JSON, pre-serialized text, or a
//! multipart form. Multipart forms are kept as owned parts so a descriptor can
//! be re-sent (hooks refetch with the same options).

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::error::ApiError;

/// One file (or field) of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub file_name: Option<String>,
    pub mime: Option<String>,
    pub data: Vec<u8>,
}

/// Re-buildable multipart form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain text field.
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.push(FormPart {
            name: name.to_string(),
            file_name: None,
            mime: None,
            data: value.as_bytes().to_vec(),
        });
        self
    }

    /// Add a file part.
    pub fn file(mut self, name: &str, file_name: &str, mime: &str, data: Vec<u8>) -> Self {
        self.parts.push(FormPart {
            name: name.to_string(),
            file_name: Some(file_name.to_string()),
            mime: Some(mime.to_string()),
            data,
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Build a fresh `reqwest` form. The bytes of every part are sent as-is.
    pub fn to_reqwest(&self) -> Result<multipart::Form, ApiError> {
        let mut form = multipart::Form::new();
        for part in &self.parts {
            let mut p = multipart::Part::bytes(part.data.clone());
            if let Some(ref file_name) = part.file_name {
                p = p.file_name(file_name.clone());
            }
            if let Some(ref mime) = part.mime {
                p = p.mime_str(mime).map_err(|e| {
                    ApiError::InvalidUpload(format!("Invalid content type {}: {}", mime, e))
                })?;
            }
            form = form.part(part.name.clone(), p);
        }
        Ok(form)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Structured data, serialized to JSON text on send.
    Json(Value),
    /// Already-serialized text, sent verbatim.
    Text(String),
    /// Multipart upload, sent untouched and without verification.
    Multipart(MultipartForm),
}

impl RequestBody {
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart(_))
    }
}

/// Method, body and header overrides for a request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<RequestBody>,
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: HeaderMap::new(),
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Attach a structured body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::Encode(e.to_string()))?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn json_value(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = Some(RequestBody::Multipart(form));
        self
    }

    /// Add a header override. Invalid names or values are rejected.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::Encode(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::Encode(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn is_multipart(&self) -> bool {
        self.body.as_ref().is_some_and(RequestBody::is_multipart)
    }
}

/// Endpoint path plus options: everything the pipeline needs to send a call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub endpoint: String,
    pub options: RequestOptions,
}

impl RequestDescriptor {
    pub fn new(endpoint: &str, options: RequestOptions) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            options,
        }
    }

    pub fn get(endpoint: &str) -> Self {
        Self::new(endpoint, RequestOptions::new(Method::GET))
    }

    pub fn post(endpoint: &str) -> Self {
        Self::new(endpoint, RequestOptions::new(Method::POST))
    }

    pub fn put(endpoint: &str) -> Self {
        Self::new(endpoint, RequestOptions::new(Method::PUT))
    }

    pub fn delete(endpoint: &str) -> Self {
        Self::new(endpoint, RequestOptions::new(Method::DELETE))
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.options.body = Some(body);
        self
    }
}

/// Methods that never carry a request body.
pub fn is_bodyless(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_multipart_detection() {
        let opts = RequestOptions::new(Method::POST).json_value(json!({"a": 1}));
        assert!(!opts.is_multipart());

        let opts = RequestOptions::new(Method::POST)
            .multipart(MultipartForm::new().file("file", "a.png", "image/png", vec![1, 2, 3]));
        assert!(opts.is_multipart());

        assert!(!RequestOptions::default().is_multipart());
    }

    #[test]
    fn test_form_keeps_parts_in_order() {
        let form = MultipartForm::new()
            .text("title", "Weekly")
            .file("file", "a.bin", "application/octet-stream", vec![0, 255]);
        assert_eq!(form.parts().len(), 2);
        assert_eq!(form.parts()[0].name, "title");
        assert_eq!(form.parts()[1].data, vec![0, 255]);
        assert!(form.to_reqwest().is_ok());
    }

    #[test]
    fn test_invalid_mime_is_rejected() {
        let form = MultipartForm::new().file("file", "a", "not a mime\n", vec![]);
        assert!(matches!(form.to_reqwest(), Err(ApiError::InvalidUpload(_))));
    }

    #[test]
    fn test_header_override() {
        let opts = RequestOptions::default().header("X-Trace", "1").unwrap();
        assert_eq!(opts.headers.get("x-trace").unwrap(), "1");
        assert!(matches!(
            RequestOptions::default().header("bad header", "1"),
            Err(ApiError::Encode(_))
        ));
        assert!(matches!(
            RequestOptions::default().header("X-Trace", "line\nbreak"),
            Err(ApiError::Encode(_))
        ));
    }

    #[test]
    fn test_bodyless_methods() {
        assert!(is_bodyless(&Method::GET));
        assert!(is_bodyless(&Method::HEAD));
        assert!(!is_bodyless(&Method::POST));
        assert!(!is_bodyless(&Method::DELETE));
    }
}
