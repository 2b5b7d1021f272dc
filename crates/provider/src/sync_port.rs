//! Adapter onto the engine's `RemoteCatalog` port.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use engine::{RemoteCatalog, SceneCandidate, SyncError};
use ledger::AssetSpec;

use crate::ProviderError;
use crate::client::Client;
use crate::models::DownloadOption;

impl From<ProviderError> for SyncError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(what) => SyncError::NotFound(what),
            ProviderError::Auth(detail) => SyncError::Config(detail),
            ProviderError::TokenNotObtained => {
                SyncError::Config("provider login returned no API token".to_string())
            }
            other => SyncError::Transient(other.to_string()),
        }
    }
}

#[async_trait]
impl RemoteCatalog for Client {
    async fn list_scenes(
        &self,
        dataset: &str,
        day: NaiveDate,
    ) -> Result<Vec<SceneCandidate>, SyncError> {
        let results = self.search_scenes(dataset, day).await?;
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let entity_ids: Vec<String> = results.iter().map(|r| r.entity_id.clone()).collect();
        let options = self.download_options(dataset, &entity_ids).await?;

        // Group usable products by scene; staging products stay out of the
        // manifest until a later scan sees them available.
        let mut manifests: HashMap<String, Vec<AssetSpec>> = HashMap::new();
        for option in options {
            if let Some(asset) = asset_from_option(option) {
                manifests.entry(asset.0).or_default().push(asset.1);
            }
        }

        Ok(results
            .into_iter()
            .map(|scene| {
                let assets = manifests.remove(&scene.entity_id).unwrap_or_default();
                SceneCandidate {
                    scene_id: scene.display_id,
                    dataset: dataset.to_string(),
                    acquisition_date: scene.acquisition_date.unwrap_or(day),
                    assets,
                    content_hash: scene.content_hash,
                    geometry: scene.spatial_bounds,
                    bbox: scene.bounding_box,
                }
            })
            .collect())
    }

    async fn fetch_asset(&self, remote_ref: &str, dest: &Path) -> Result<u64, SyncError> {
        Ok(self.fetch_asset(remote_ref, dest).await?)
    }
}

fn asset_from_option(option: DownloadOption) -> Option<(String, AssetSpec)> {
    if !option.available {
        return None;
    }
    let name = option.file_name?;
    let remote_ref = option.url?;
    let size = option.filesize?;
    Some((
        option.entity_id,
        AssetSpec {
            name,
            remote_ref,
            size,
        },
    ))
}
