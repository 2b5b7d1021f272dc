//! Catalog registrar: builds catalog items from stored scenes and upserts
//! them against the spatiotemporal catalog API, idempotently.
//!
//! Upsert semantics: "created" and "already exists with identical content"
//! are both success; an existing item with different content at the same id
//! is an identity collision and is surfaced, never overwritten.

pub mod canonical;
pub mod client;
pub mod item;
pub mod registrar;

pub use canonical::canonical_hash;
pub use client::{CatalogClient, CatalogConfig, CreateOutcome};
pub use item::{CatalogItem, build_item};
pub use registrar::{Registrar, UpsertOutcome};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog returned HTTP {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("catalog authentication rejected: {0}")]
    Auth(String),

    #[error("catalog token missing from auth response")]
    TokenNotObtained,

    #[error("catalog resource not found: {0}")]
    NotFound(String),

    #[error("unexpected payload from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        source: serde_json::Error,
    },
}

impl CatalogError {
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CatalogError::Status { status, .. } => *status >= 500 || *status == 429,
            CatalogError::NotFound(_) => true,
            CatalogError::Auth(_) | CatalogError::TokenNotObtained | CatalogError::Decode { .. } => {
                false
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("scene {scene_id} is not stored yet; registration refused")]
    NotStored { scene_id: String },

    #[error(
        "catalog conflict for item {item_id}: existing content hash {existing_hash} differs from {candidate_hash}"
    )]
    Conflict {
        item_id: String,
        existing_hash: String,
        candidate_hash: String,
    },

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
