use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Request/response payloads for the provider machine API. Responses wrap
/// their payload in a `data` envelope.

#[derive(Serialize, Debug)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub token: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct LoginResponse {
    pub data: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SceneSearchRequest<'a> {
    pub dataset_name: &'a str,
    pub max_results: u32,
    pub starting_number: u64,
    pub scene_filter: SceneFilter<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SceneFilter<'a> {
    pub acquisition_filter: AcquisitionFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_filter: Option<SpatialFilter<'a>>,
}

#[derive(Serialize, Debug)]
pub struct AcquisitionFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SpatialFilter<'a> {
    pub filter_type: &'static str,
    pub geo_json: &'a serde_json::Value,
}

#[derive(Deserialize, Debug)]
pub struct SceneSearchResponse {
    pub data: SceneSearchData,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SceneSearchData {
    #[serde(default)]
    pub results: Vec<SceneResult>,
    #[serde(default)]
    pub records_returned: u64,
    /// Not assumed stable across retries; informational only.
    #[serde(default)]
    pub total_hits: Option<u64>,
    /// Starting number of the next page; absent or zero when exhausted.
    #[serde(default)]
    pub next_record: Option<u64>,
}

/// One scene as returned by `scene-search`.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SceneResult {
    pub entity_id: String,
    pub display_id: String,
    #[serde(default)]
    pub acquisition_date: Option<NaiveDate>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub spatial_bounds: Option<serde_json::Value>,
    #[serde(default)]
    pub bounding_box: Option<[f64; 4]>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptionsRequest<'a> {
    pub dataset_name: &'a str,
    pub entity_ids: &'a [String],
}

#[derive(Deserialize, Debug)]
pub struct DownloadOptionsResponse {
    #[serde(default)]
    pub data: Vec<DownloadOption>,
}

/// One downloadable product for a scene. Products the provider is still
/// staging come back with `available == false` and are left out of the
/// asset manifest until a later scan.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOption {
    pub entity_id: String,
    pub available: bool,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
}
