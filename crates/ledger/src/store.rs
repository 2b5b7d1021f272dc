use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use diagnostics::*;
use tokio::sync::Mutex;

use crate::model::{SceneRecord, TransferState};
use crate::LedgerError;

/// Injectable ledger abstraction.
///
/// `compare_and_swap` is the only mutation primitive besides `insert`: the
/// caller names the state it believes the record is in, and the swap fails
/// with [`LedgerError::StateConflict`] if another actor moved the record in
/// the meantime.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, scene_id: &str) -> Result<Option<SceneRecord>, LedgerError>;

    /// Insert a new record; the scene must not already be present.
    async fn insert(&self, record: SceneRecord) -> Result<(), LedgerError>;

    /// Replace the record for `scene_id`, provided its current transfer
    /// state equals `expected`.
    async fn compare_and_swap(
        &self,
        scene_id: &str,
        expected: TransferState,
        updated: SceneRecord,
    ) -> Result<(), LedgerError>;

    async fn list_by_state(&self, state: TransferState) -> Result<Vec<SceneRecord>, LedgerError>;

    async fn list_all(&self) -> Result<Vec<SceneRecord>, LedgerError>;
}

/// Durable ledger backed by a single JSON document on disk.
///
/// Every mutation rewrites the document through a temp-file-then-rename,
/// so a crash mid-write leaves the previous version intact.
pub struct FileLedger {
    path: PathBuf,
    records: Mutex<BTreeMap<String, SceneRecord>>,
}

impl FileLedger {
    /// Open the ledger at `path`, loading existing records if the file is
    /// present.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let count = records.len();
        info!("Opened scene ledger with {count} records");

        Ok(FileLedger {
            path,
            records: Mutex::new(records),
        })
    }

    async fn persist(&self, records: &BTreeMap<String, SceneRecord>) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FileLedger {
    async fn get(&self, scene_id: &str) -> Result<Option<SceneRecord>, LedgerError> {
        let records = self.records.lock().await;
        Ok(records.get(scene_id).cloned())
    }

    async fn insert(&self, record: SceneRecord) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.scene_id) {
            return Err(LedgerError::DuplicateScene {
                scene_id: record.scene_id,
            });
        }
        let scene_id = record.scene_id.clone();
        records.insert(scene_id.clone(), record);
        self.persist(&records).await?;
        debug!("Ledger insert: scene {scene_id}");
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        scene_id: &str,
        expected: TransferState,
        updated: SceneRecord,
    ) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        let current = records.get(scene_id).ok_or_else(|| LedgerError::UnknownScene {
            scene_id: scene_id.to_string(),
        })?;

        if current.transfer_state != expected {
            return Err(LedgerError::StateConflict {
                scene_id: scene_id.to_string(),
                expected,
                actual: current.transfer_state,
            });
        }

        let transition = format!("{expected} -> {}", updated.transfer_state);
        records.insert(scene_id.to_string(), updated);
        self.persist(&records).await?;
        debug!("Ledger swap: scene {scene_id} {transition}");
        Ok(())
    }

    async fn list_by_state(&self, state: TransferState) -> Result<Vec<SceneRecord>, LedgerError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| r.transfer_state == state)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<SceneRecord>, LedgerError> {
        let records = self.records.lock().await;
        Ok(records.values().cloned().collect())
    }
}

/// In-memory ledger for tests and dry runs.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<BTreeMap<String, SceneRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get(&self, scene_id: &str) -> Result<Option<SceneRecord>, LedgerError> {
        let records = self.records.lock().await;
        Ok(records.get(scene_id).cloned())
    }

    async fn insert(&self, record: SceneRecord) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.scene_id) {
            return Err(LedgerError::DuplicateScene {
                scene_id: record.scene_id,
            });
        }
        records.insert(record.scene_id.clone(), record);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        scene_id: &str,
        expected: TransferState,
        updated: SceneRecord,
    ) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        let current = records.get(scene_id).ok_or_else(|| LedgerError::UnknownScene {
            scene_id: scene_id.to_string(),
        })?;

        if current.transfer_state != expected {
            return Err(LedgerError::StateConflict {
                scene_id: scene_id.to_string(),
                expected,
                actual: current.transfer_state,
            });
        }

        records.insert(scene_id.to_string(), updated);
        Ok(())
    }

    async fn list_by_state(&self, state: TransferState) -> Result<Vec<SceneRecord>, LedgerError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| r.transfer_state == state)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<SceneRecord>, LedgerError> {
        let records = self.records.lock().await;
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: &str, state: TransferState) -> SceneRecord {
        let mut r = SceneRecord::discovered(
            id,
            "landsat_ot_c2_l1",
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        );
        r.transfer_state = state;
        r
    }

    #[tokio::test]
    async fn file_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        {
            let ledger = FileLedger::open(&path).await.unwrap();
            ledger.insert(record("scene-a", TransferState::Discovered)).await.unwrap();
            ledger
                .compare_and_swap(
                    "scene-a",
                    TransferState::Discovered,
                    record("scene-a", TransferState::Stored),
                )
                .await
                .unwrap();
        }

        let reopened = FileLedger::open(&path).await.unwrap();
        let found = reopened.get("scene-a").await.unwrap().unwrap();
        assert_eq!(found.transfer_state, TransferState::Stored);
    }

    #[tokio::test]
    async fn cas_rejects_stale_state() {
        let ledger = MemoryLedger::new();
        ledger.insert(record("scene-a", TransferState::Downloading)).await.unwrap();

        let err = ledger
            .compare_and_swap(
                "scene-a",
                TransferState::Discovered,
                record("scene-a", TransferState::Stored),
            )
            .await
            .unwrap_err();

        match err {
            LedgerError::StateConflict { expected, actual, .. } => {
                assert_eq!(expected, TransferState::Discovered);
                assert_eq!(actual, TransferState::Downloading);
            }
            other => panic!("unexpected error: {other}"),
        }

        // The stale swap must not have clobbered the record.
        let current = ledger.get("scene-a").await.unwrap().unwrap();
        assert_eq!(current.transfer_state, TransferState::Downloading);
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let ledger = MemoryLedger::new();
        ledger.insert(record("scene-a", TransferState::Discovered)).await.unwrap();
        let err = ledger.insert(record("scene-a", TransferState::Discovered)).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateScene { .. }));
    }

    #[tokio::test]
    async fn list_by_state_filters() {
        let ledger = MemoryLedger::new();
        ledger.insert(record("scene-a", TransferState::Stored)).await.unwrap();
        ledger.insert(record("scene-b", TransferState::Discovered)).await.unwrap();
        ledger.insert(record("scene-c", TransferState::Stored)).await.unwrap();

        let stored = ledger.list_by_state(TransferState::Stored).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.transfer_state == TransferState::Stored));
    }
}
