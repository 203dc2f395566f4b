//! API client module for the RT3 client.
//!
//! Provides the auth-gated request pipeline, session token storage, upload
//! and session operations, and the request/response types of the RT3 API.

pub mod client;
pub mod error;
pub mod request;
pub mod session;
pub mod token;
pub mod types;
pub mod uploads;
pub mod urls;
#[cfg(test)]
mod tests;

pub use client::ApiClient;
pub use error::ApiError;
pub use request::{MultipartForm, RequestBody, RequestDescriptor, RequestOptions};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use urls::ApiUrls;
