use std::path::Path;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, NaiveDate, Utc};
use diagnostics::*;
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::ProviderError;
use crate::models::*;

const TIMEOUT_SECONDS: u64 = 60;
const PAGE_SIZE: u32 = 1000;
const TOKEN_VALIDITY_HOURS: i64 = 2;

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the machine API, e.g. `https://m2m.provider.example/api/`.
    pub endpoint: String,
    pub username: String,
    pub token: String,
    /// Optional GeoJSON region restricting scene searches.
    pub region_geojson: Option<serde_json::Value>,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            endpoint: String::new(),
            username: String::new(),
            token: String::new(),
            region_geojson: None,
            timeout_secs: TIMEOUT_SECONDS,
            max_retries: 5,
        }
    }
}

#[derive(Debug)]
struct ApiToken {
    value: String,
    valid_until: DateTime<Utc>,
}

/// Async provider API client with login-token authentication.
///
/// The API token carries a validity horizon; expired tokens are refreshed
/// transparently before the next authenticated call.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    config: ProviderConfig,
    api_token: Mutex<Option<ApiToken>>,
}

impl Client {
    /// Create a client and perform the initial login.
    pub async fn login(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let client = Client {
            http,
            config,
            api_token: Mutex::new(None),
        };
        client.refresh_token().await?;
        Ok(client)
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn refresh_token(&self) -> Result<String, ProviderError> {
        let url = self.endpoint_url("login-token");
        let request = LoginRequest {
            username: &self.config.username,
            token: &self.config.token,
        };

        debug!("Logging in to provider API at {url}");
        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!("login rejected with HTTP {status}")));
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                endpoint: url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let login: LoginResponse =
            serde_json::from_str(&body).map_err(|source| ProviderError::Decode {
                endpoint: url,
                source,
            })?;
        let token = login.data.ok_or(ProviderError::TokenNotObtained)?;

        let mut guard = self.api_token.lock().await;
        *guard = Some(ApiToken {
            value: token.clone(),
            valid_until: Utc::now() + chrono::Duration::hours(TOKEN_VALIDITY_HOURS),
        });
        Ok(token)
    }

    /// Current API token, refreshed when past its validity horizon.
    async fn api_token(&self) -> Result<String, ProviderError> {
        {
            let guard = self.api_token.lock().await;
            if let Some(token) = guard.as_ref() {
                if token.valid_until > Utc::now() {
                    return Ok(token.value.clone());
                }
            }
        }
        self.refresh_token().await
    }

    /// POST a payload and decode the JSON response, retrying transient
    /// failures with exponential backoff and jitter.
    async fn post_json<B, T>(&self, path: &str, payload: &B) -> Result<T, ProviderError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint_url(path);

        (|| async { self.post_json_once(&url, payload).await })
            .retry(
                ExponentialBuilder::default()
                    .with_max_times(self.config.max_retries)
                    .with_jitter(),
            )
            .when(ProviderError::is_transient)
            .notify(|err: &ProviderError, after: Duration| {
                let detail = err.to_string();
                let wait_secs = after.as_secs_f64();
                warn!("Provider call failed ({detail}), retrying in {wait_secs} s");
            })
            .await
    }

    async fn post_json_once<B, T>(&self, url: &str, payload: &B) -> Result<T, ProviderError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let token = self.api_token().await?;
        debug!("Sending request to {url}");

        let response = self
            .http
            .post(url)
            .header("X-Auth-Token", token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| ProviderError::Decode {
            endpoint: url.to_string(),
            source,
        })
    }

    /// All scenes of `dataset` acquired on `day`, following pagination.
    ///
    /// Partial pages are accepted as they come; the reported total is never
    /// trusted across retries.
    pub async fn search_scenes(
        &self,
        dataset: &str,
        day: NaiveDate,
    ) -> Result<Vec<SceneResult>, ProviderError> {
        let mut results = Vec::new();
        let mut starting_number = 1u64;

        loop {
            let request = SceneSearchRequest {
                dataset_name: dataset,
                max_results: PAGE_SIZE,
                starting_number,
                scene_filter: SceneFilter {
                    acquisition_filter: AcquisitionFilter { start: day, end: day },
                    spatial_filter: self.config.region_geojson.as_ref().map(|geo_json| {
                        SpatialFilter {
                            filter_type: "geojson",
                            geo_json,
                        }
                    }),
                },
            };

            let response: SceneSearchResponse = self.post_json("scene-search", &request).await?;
            let page = response.data;
            let returned = page.results.len();
            let day_label = day.to_string();
            debug!("scene-search for {dataset} on {day_label}: {returned} records");
            results.extend(page.results);

            match page.next_record {
                Some(next) if next > starting_number && returned > 0 => starting_number = next,
                _ => break,
            }
        }

        Ok(results)
    }

    /// Download options for a batch of scenes.
    pub async fn download_options(
        &self,
        dataset: &str,
        entity_ids: &[String],
    ) -> Result<Vec<DownloadOption>, ProviderError> {
        let request = DownloadOptionsRequest {
            dataset_name: dataset,
            entity_ids,
        };
        let response: DownloadOptionsResponse =
            self.post_json("download-options", &request).await?;
        Ok(response.data)
    }

    /// Stream one asset into `dest`, returning the bytes written.
    pub async fn fetch_asset(&self, url: &str, dest: &Path) -> Result<u64, ProviderError> {
        info!("Downloading {url}");
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {written} bytes from {url}");
        Ok(written)
    }
}
