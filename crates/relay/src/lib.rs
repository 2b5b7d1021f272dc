//! Signed-reference relay: translates a published catalog asset reference
//! into a short-lived presigned URL against the object store, without ever
//! exposing storage credentials to clients.
//!
//! Stateless; each request is an independent parse → existence check →
//! presign. URLs are minted per response and never cached. Error bodies
//! never carry bucket, key, or credential detail.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use diagnostics::*;
use store::{ObjectReference, ObjectStore, StoreError};
use warp::Filter;
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use warp::http::{Response, StatusCode};
use warp::hyper::Body;

/// The slice of the object store the relay needs: read-only existence,
/// presigning, and ranged reads.
#[async_trait]
pub trait SignedStore: Send + Sync {
    fn bucket(&self) -> &str;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    async fn presign(&self, key: &str, ttl_secs: u32) -> Result<String, StoreError>;
    async fn read_range(&self, key: &str, offset: u64, len: u64) -> Result<Vec<u8>, StoreError>;
}

#[async_trait]
impl SignedStore for ObjectStore {
    fn bucket(&self) -> &str {
        self.bucket_name()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        ObjectStore::exists(self, key, None).await
    }

    async fn presign(&self, key: &str, ttl_secs: u32) -> Result<String, StoreError> {
        ObjectStore::presign_get(self, key, ttl_secs).await
    }

    async fn read_range(&self, key: &str, offset: u64, len: u64) -> Result<Vec<u8>, StoreError> {
        ObjectStore::read_range(self, key, offset, len).await
    }
}

pub struct RelayService {
    store: Arc<dyn SignedStore>,
    url_ttl_secs: u32,
}

impl RelayService {
    pub fn new(store: Arc<dyn SignedStore>, url_ttl_secs: u32) -> Self {
        RelayService {
            store,
            url_ttl_secs,
        }
    }

    /// Resolve one published asset path into a response: a redirect at a
    /// freshly minted presigned URL, or a ranged slice of the object when
    /// the `member`/`offset`/`size` parameters ask for one.
    pub async fn resolve(&self, path: &str, params: &HashMap<String, String>) -> Response<Body> {
        let reference = match ObjectReference::parse(self.store.bucket(), path) {
            Ok(reference) => reference,
            Err(e) => {
                let detail = e.to_string();
                info!("Rejected reference {path}: {detail}");
                return error_response(StatusCode::BAD_REQUEST, "invalid reference");
            }
        };

        match self.store.exists(&reference.key).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Reference {path} does not resolve to a stored object");
                return error_response(StatusCode::NOT_FOUND, "not found");
            }
            Err(e) => {
                let detail = e.to_string();
                error!("Existence check failed for {path}: {detail}");
                return error_response(StatusCode::BAD_GATEWAY, "upstream storage failure");
            }
        }

        if let Some(member) = params.get("member") {
            return self.serve_member(&reference, member, params).await;
        }

        match self.store.presign(&reference.key, self.url_ttl_secs).await {
            Ok(url) => {
                let ttl = self.url_ttl_secs;
                info!("Resolved {path} to a presigned URL valid {ttl} seconds");
                build_response(
                    Response::builder()
                        .status(StatusCode::FOUND)
                        .header(LOCATION, url)
                        .body(Body::empty()),
                )
            }
            Err(e) => {
                let detail = e.to_string();
                error!("Presign failed for {path}: {detail}");
                error_response(StatusCode::BAD_GATEWAY, "upstream storage failure")
            }
        }
    }

    /// Stream one member of a stored archive by byte range, as published in
    /// the catalog's member metadata.
    async fn serve_member(
        &self,
        reference: &ObjectReference,
        member: &str,
        params: &HashMap<String, String>,
    ) -> Response<Body> {
        let offset: u64 = params
            .get("offset")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let size: u64 = params.get("size").and_then(|s| s.parse().ok()).unwrap_or(0);

        if size == 0 || !is_safe_filename(member) {
            return error_response(StatusCode::BAD_REQUEST, "invalid member request");
        }

        match self.store.read_range(&reference.key, offset, size).await {
            Ok(bytes) => {
                info!("Serving member {member} ({size} bytes at offset {offset})");
                build_response(
                    Response::builder()
                        .header(CONTENT_TYPE, "application/octet-stream")
                        .header(
                            CONTENT_DISPOSITION,
                            format!("attachment; filename={member}"),
                        )
                        .header(CONTENT_LENGTH, bytes.len())
                        .body(Body::from(bytes)),
                )
            }
            Err(e) => {
                let detail = e.to_string();
                error!("Ranged read failed for member {member}: {detail}");
                error_response(StatusCode::BAD_GATEWAY, "upstream storage failure")
            }
        }
    }
}

fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": message }).to_string();
    build_response(
        Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body)),
    )
}

fn build_response(result: Result<Response<Body>, warp::http::Error>) -> Response<Body> {
    result.unwrap_or_else(|_| {
        let mut fallback = Response::new(Body::from(r#"{"error":"internal"}"#));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// The relay's single route: GET over the full path tail.
pub fn routes(
    service: Arc<RelayService>,
) -> impl Filter<Extract = (Response<Body>,), Error = warp::Rejection> + Clone {
    let service = warp::any().map(move || service.clone());

    warp::get()
        .and(warp::path::tail())
        .and(warp::query::<HashMap<String, String>>())
        .and(service)
        .and_then(
            |tail: warp::path::Tail,
             params: HashMap<String, String>,
             service: Arc<RelayService>| async move {
                Ok::<_, warp::Rejection>(service.resolve(tail.as_str(), &params).await)
            },
        )
}

/// Serve the relay until the process is stopped.
pub async fn serve(service: Arc<RelayService>, addr: SocketAddr) {
    let listen = addr.to_string();
    info!("Relay listening on {listen}");
    warp::serve(routes(service)).run(addr).await
}
