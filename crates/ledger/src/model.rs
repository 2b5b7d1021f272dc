use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle of one scene through the pipeline.
///
/// The ordering is meaningful: a record only ever moves forward
/// (Discovered < Downloading < Stored < Registered), except for the
/// explicit content-hash reset, which is the sole regression path.
/// Failed is terminal until an operator resets the record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransferState {
    Discovered,
    Downloading,
    Stored,
    Registered,
    Failed,
}

impl TransferState {
    /// Terminal states take no further part in automatic cycles.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Registered | TransferState::Failed)
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransferState::Discovered => "discovered",
            TransferState::Downloading => "downloading",
            TransferState::Stored => "stored",
            TransferState::Registered => "registered",
            TransferState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One downloadable asset of a scene, as reported by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssetSpec {
    /// Asset name; becomes the object filename and the catalog asset key.
    pub name: String,
    /// Provider download reference (an absolute URL).
    pub remote_ref: String,
    /// Expected content size in bytes.
    pub size: u64,
}

/// One remote-provider scene and its transfer/registration history.
///
/// Created when a scene is first observed in a window scan; mutated only
/// through the ledger store; never deleted. Failed and Registered records
/// form the audit trail that prevents duplicate transfer and registration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SceneRecord {
    pub scene_id: String,
    /// Provider dataset; doubles as catalog collection and object-key prefix.
    pub dataset: String,
    /// UTC calendar date the scene was captured.
    pub acquisition_date: NaiveDate,
    /// Ordered asset manifest; may be incomplete while the provider is still
    /// staging downloads.
    #[serde(default)]
    pub assets: Vec<AssetSpec>,
    /// Source integrity hash, when the provider publishes one.
    #[serde(default)]
    pub content_hash: Option<String>,
    /// Spatial footprint carried into the catalog item.
    #[serde(default)]
    pub geometry: Option<serde_json::Value>,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    pub transfer_state: TransferState,
    /// Consecutive cycles this scene has failed; reset on success and on
    /// the content-hash reset path.
    #[serde(default)]
    pub failures: u32,
    /// Set by the content-hash reset path: re-upload assets even when the
    /// store already holds a matching key.
    #[serde(default)]
    pub force_refetch: bool,
    /// Catalog item id once the scene has been registered.
    #[serde(default)]
    pub item_id: Option<String>,
    /// Most recent error, kept for operator attention.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl SceneRecord {
    /// A freshly discovered scene, before any transfer work.
    pub fn discovered(
        scene_id: impl Into<String>,
        dataset: impl Into<String>,
        acquisition_date: NaiveDate,
    ) -> Self {
        SceneRecord {
            scene_id: scene_id.into(),
            dataset: dataset.into(),
            acquisition_date,
            assets: Vec::new(),
            content_hash: None,
            geometry: None,
            bbox: None,
            transfer_state: TransferState::Discovered,
            failures: 0,
            force_refetch: false,
            item_id: None,
            last_error: None,
        }
    }

    /// Reset for re-scan after the provider re-published the scene with a
    /// different content hash. This is the only transition that moves a
    /// record backwards.
    pub fn reset_for_rescan(&mut self, new_hash: Option<String>, assets: Vec<AssetSpec>) {
        self.transfer_state = TransferState::Discovered;
        self.content_hash = new_hash;
        self.assets = assets;
        self.failures = 0;
        self.force_refetch = true;
        self.item_id = None;
        self.last_error = None;
    }

    /// Object-store key for one of this scene's assets.
    pub fn object_key(&self, asset: &AssetSpec) -> String {
        format!("{}/{}", self.dataset, asset.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn state_ordering_is_monotonic() {
        assert!(TransferState::Discovered < TransferState::Downloading);
        assert!(TransferState::Downloading < TransferState::Stored);
        assert!(TransferState::Stored < TransferState::Registered);
    }

    #[test]
    fn reset_clears_progress() {
        let mut record = SceneRecord::discovered("LC91920252024", "landsat_ot_c2_l1", day("2024-03-05"));
        record.transfer_state = TransferState::Registered;
        record.failures = 2;
        record.item_id = Some("LC91920252024".to_string());

        record.reset_for_rescan(Some("abc".to_string()), Vec::new());

        assert_eq!(record.transfer_state, TransferState::Discovered);
        assert_eq!(record.failures, 0);
        assert_eq!(record.content_hash.as_deref(), Some("abc"));
        assert!(record.item_id.is_none());
    }

    #[test]
    fn object_key_is_dataset_prefixed() {
        let mut record = SceneRecord::discovered("scene-1", "landsat_ot_c2_l1", day("2024-03-05"));
        record.assets.push(AssetSpec {
            name: "scene-1.tar".to_string(),
            remote_ref: "https://provider.example/download/1".to_string(),
            size: 10,
        });
        assert_eq!(
            record.object_key(&record.assets[0]),
            "landsat_ot_c2_l1/scene-1.tar"
        );
    }
}
