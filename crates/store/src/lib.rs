//! Object-store client for an S3-compatible service: existence checks with
//! size verification, streaming uploads, presigned download URLs, and
//! ranged reads for the relay.

pub mod object_store;
pub mod reference;

pub use object_store::{ObjectStore, StoreConfig};
pub use reference::ObjectReference;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store error: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("credentials error: {0}")]
    Credentials(#[from] s3::creds::error::CredentialsError),

    #[error("object store returned HTTP {code}")]
    UnexpectedStatus { code: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejection of a would-be object reference before any store call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("invalid object reference: {0}")]
    Invalid(&'static str),
}
