use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use diagnostics::*;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::CatalogError;

const TIMEOUT_SECONDS: u64 = 60;
const TOKEN_VALIDITY_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL of the catalog API, e.g. `https://catalog.example`.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            endpoint: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: TIMEOUT_SECONDS,
            max_retries: 5,
        }
    }
}

#[derive(Deserialize)]
struct AuthResponse {
    token: Option<String>,
}

struct BearerToken {
    value: String,
    valid_until: DateTime<Utc>,
}

/// Outcome of a create attempt against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// An item with this id already exists; the caller decides whether that
    /// is idempotent success or an identity collision.
    AlreadyExists,
}

/// Bearer-token catalog API client.
pub struct CatalogClient {
    http: reqwest::Client,
    config: CatalogConfig,
    token: Mutex<Option<BearerToken>>,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(CatalogClient {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn authenticate(&self) -> Result<String, CatalogError> {
        let url = self.endpoint_url("auth");
        debug!("Authenticating against catalog at {url}");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CatalogError::Auth(format!("auth rejected with HTTP {status}")));
        }
        if !status.is_success() {
            return Err(CatalogError::Status {
                endpoint: url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let auth: AuthResponse =
            serde_json::from_str(&body).map_err(|source| CatalogError::Decode {
                endpoint: url,
                source,
            })?;
        let token = auth.token.ok_or(CatalogError::TokenNotObtained)?;

        let mut guard = self.token.lock().await;
        *guard = Some(BearerToken {
            value: token.clone(),
            valid_until: Utc::now() + chrono::Duration::hours(TOKEN_VALIDITY_HOURS),
        });
        Ok(token)
    }

    async fn bearer_token(&self) -> Result<String, CatalogError> {
        {
            let guard = self.token.lock().await;
            if let Some(token) = guard.as_ref() {
                if token.valid_until > Utc::now() {
                    return Ok(token.value.clone());
                }
            }
        }
        self.authenticate().await
    }

    /// POST a new item document. HTTP 409 maps to `AlreadyExists`.
    pub async fn create_item(
        &self,
        collection: &str,
        document: &Value,
    ) -> Result<CreateOutcome, CatalogError> {
        let url = self.endpoint_url(&format!("collections/{collection}/items"));

        (|| async {
            let token = self.bearer_token().await?;
            let response = self
                .http
                .post(&url)
                .bearer_auth(token)
                .json(document)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::CONFLICT {
                return Ok(CreateOutcome::AlreadyExists);
            }
            if !status.is_success() {
                return Err(CatalogError::Status {
                    endpoint: url.clone(),
                    status: status.as_u16(),
                });
            }
            Ok(CreateOutcome::Created)
        })
        .retry(
            ExponentialBuilder::default()
                .with_max_times(self.config.max_retries)
                .with_jitter(),
        )
        .when(CatalogError::is_transient)
        .notify(|err: &CatalogError, after: Duration| {
            let detail = err.to_string();
            let wait_secs = after.as_secs_f64();
            warn!("Catalog call failed ({detail}), retrying in {wait_secs} s");
        })
        .await
    }

    /// Fetch an existing item document; `None` when the catalog has no item
    /// at this id.
    pub async fn get_item(
        &self,
        collection: &str,
        item_id: &str,
    ) -> Result<Option<Value>, CatalogError> {
        let url = self.endpoint_url(&format!("collections/{collection}/items/{item_id}"));

        (|| async {
            let token = self.bearer_token().await?;
            let response = self.http.get(&url).bearer_auth(token).send().await?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(CatalogError::Status {
                    endpoint: url.clone(),
                    status: status.as_u16(),
                });
            }

            let body = response.text().await?;
            let document =
                serde_json::from_str(&body).map_err(|source| CatalogError::Decode {
                    endpoint: url.clone(),
                    source,
                })?;
            Ok(Some(document))
        })
        .retry(
            ExponentialBuilder::default()
                .with_max_times(self.config.max_retries)
                .with_jitter(),
        )
        .when(CatalogError::is_transient)
        .notify(|err: &CatalogError, after: Duration| {
            let detail = err.to_string();
            let wait_secs = after.as_secs_f64();
            warn!("Catalog call failed ({detail}), retrying in {wait_secs} s");
        })
        .await
    }
}
