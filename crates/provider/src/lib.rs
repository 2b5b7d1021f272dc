//! Remote imagery provider client: token login, per-day scene search with
//! pagination, download-option manifest assembly, and streaming asset fetch.
//!
//! The provider speaks a JSON-over-POST machine API; every call is wrapped
//! in a per-request timeout and exponential backoff with jitter.

pub mod client;
pub mod models;

mod sync_port;

pub use client::{Client, ProviderConfig};
pub use models::{DownloadOption, SceneResult};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("API token missing from login response")]
    TokenNotObtained,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("unexpected payload from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Whether a retry on a later attempt (or cycle) can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ProviderError::Status { status, .. } => *status >= 500 || *status == 429,
            ProviderError::Io(_) => true,
            ProviderError::Auth(_)
            | ProviderError::TokenNotObtained
            | ProviderError::NotFound(_)
            | ProviderError::Decode { .. } => false,
        }
    }
}
