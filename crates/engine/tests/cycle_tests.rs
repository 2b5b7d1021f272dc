use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use engine::{
    AssetStore, CatalogRegistrar, EngineConfig, Registration, RegistrationOutcome, RemoteCatalog,
    SceneCandidate, SyncEngine, SyncError,
};
use ledger::{AssetSpec, LedgerStore, MemoryLedger, SceneRecord, TransferState};
use tokio::sync::Mutex;

const DATASET: &str = "landsat_ot_c2_l1";

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn candidate(scene_id: &str, acquired: &str, assets: Vec<AssetSpec>) -> SceneCandidate {
    SceneCandidate {
        scene_id: scene_id.to_string(),
        dataset: DATASET.to_string(),
        acquisition_date: day(acquired),
        assets,
        content_hash: Some(format!("hash-{scene_id}")),
        geometry: None,
        bbox: Some([14.0, 49.0, 15.0, 50.0]),
    }
}

fn asset(name: &str, size: u64) -> AssetSpec {
    AssetSpec {
        name: name.to_string(),
        remote_ref: format!("https://provider.example/download/{name}"),
        size,
    }
}

/// Provider fake: per-day scene lists, byte-counting fetches, optional
/// always-failing refs.
#[derive(Default)]
struct FakeCatalog {
    scenes: Mutex<HashMap<NaiveDate, Vec<SceneCandidate>>>,
    failing_refs: Mutex<HashSet<String>>,
    fetch_count: AtomicUsize,
    listed_days: Mutex<Vec<NaiveDate>>,
}

impl FakeCatalog {
    async fn put_scene(&self, scene: SceneCandidate) {
        let mut scenes = self.scenes.lock().await;
        scenes.entry(scene.acquisition_date).or_default().push(scene);
    }

    async fn fail_ref(&self, remote_ref: &str) {
        self.failing_refs.lock().await.insert(remote_ref.to_string());
    }

    async fn heal_ref(&self, remote_ref: &str) {
        self.failing_refs.lock().await.remove(remote_ref);
    }

    async fn set_content_hash(&self, scene_id: &str, hash: &str) {
        let mut scenes = self.scenes.lock().await;
        for list in scenes.values_mut() {
            for scene in list.iter_mut() {
                if scene.scene_id == scene_id {
                    scene.content_hash = Some(hash.to_string());
                }
            }
        }
    }
}

#[async_trait]
impl RemoteCatalog for FakeCatalog {
    async fn list_scenes(
        &self,
        _dataset: &str,
        day: NaiveDate,
    ) -> Result<Vec<SceneCandidate>, SyncError> {
        self.listed_days.lock().await.push(day);
        let scenes = self.scenes.lock().await;
        Ok(scenes.get(&day).cloned().unwrap_or_default())
    }

    async fn fetch_asset(&self, remote_ref: &str, dest: &Path) -> Result<u64, SyncError> {
        if self.failing_refs.lock().await.contains(remote_ref) {
            return Err(SyncError::Transient(format!("connection reset: {remote_ref}")));
        }
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        // Write as many bytes as the manifest promised for this ref.
        let size = {
            let scenes = self.scenes.lock().await;
            scenes
                .values()
                .flatten()
                .flat_map(|s| s.assets.iter())
                .find(|a| a.remote_ref == remote_ref)
                .map(|a| a.size)
                .unwrap_or(0)
        };
        tokio::fs::write(dest, vec![0u8; size as usize]).await.unwrap();
        Ok(size)
    }
}

/// Object-store fake: key -> size, with a put counter.
#[derive(Default)]
struct FakeStore {
    objects: Mutex<HashMap<String, u64>>,
    put_count: AtomicUsize,
}

#[async_trait]
impl AssetStore for FakeStore {
    async fn exists(&self, key: &str, expected_size: Option<u64>) -> Result<bool, SyncError> {
        let objects = self.objects.lock().await;
        Ok(match (objects.get(key), expected_size) {
            (Some(stored), Some(expected)) => *stored == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    async fn put_file(&self, path: &Path, key: &str) -> Result<(), SyncError> {
        let size = tokio::fs::metadata(path).await.unwrap().len();
        self.objects.lock().await.insert(key.to_string(), size);
        self.put_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Registrar fake: counts upserts, can be told to report conflicts.
#[derive(Default)]
struct FakeRegistrar {
    items: Mutex<BTreeMap<String, String>>,
    conflicts: Mutex<HashSet<String>>,
    upsert_count: AtomicUsize,
}

#[async_trait]
impl CatalogRegistrar for FakeRegistrar {
    async fn upsert(&self, scene: &SceneRecord) -> Result<Registration, SyncError> {
        assert!(
            scene.transfer_state >= TransferState::Stored,
            "registrar handed a record that is not stored"
        );
        self.upsert_count.fetch_add(1, Ordering::SeqCst);

        let item_id = scene.scene_id.clone();
        if self.conflicts.lock().await.contains(&item_id) {
            return Err(SyncError::Conflict {
                item_id,
                detail: "existing item differs".to_string(),
            });
        }

        let hash = scene.content_hash.clone().unwrap_or_default();
        let mut items = self.items.lock().await;
        let outcome = match items.get(&item_id) {
            Some(existing) if *existing == hash => RegistrationOutcome::Unchanged,
            _ => {
                items.insert(item_id.clone(), hash);
                RegistrationOutcome::Created
            }
        };
        Ok(Registration { item_id, outcome })
    }
}

struct Harness {
    ledger: Arc<MemoryLedger>,
    catalog: Arc<FakeCatalog>,
    store: Arc<FakeStore>,
    registrar: Arc<FakeRegistrar>,
    engine: SyncEngine,
    _workdir: tempfile::TempDir,
}

fn harness_with(max_scene_failures: u32) -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let catalog = Arc::new(FakeCatalog::default());
    let store = Arc::new(FakeStore::default());
    let registrar = Arc::new(FakeRegistrar::default());
    let workdir = tempfile::tempdir().unwrap();

    let engine = SyncEngine::new(
        ledger.clone(),
        catalog.clone(),
        store.clone(),
        registrar.clone(),
        vec![DATASET.to_string()],
        EngineConfig {
            window_days: 30,
            max_scene_failures,
            parallel_transfers: 4,
            working_dir: workdir.path().to_path_buf(),
        },
    );

    Harness {
        ledger,
        catalog,
        store,
        registrar,
        engine,
        _workdir: workdir,
    }
}

fn harness() -> Harness {
    harness_with(5)
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 31, 9, 0, 0).unwrap()
}

#[tokio::test]
async fn second_cycle_over_unchanged_scenes_is_a_noop() {
    let h = harness();
    h.catalog
        .put_scene(candidate(
            "scene-a",
            "2024-03-05",
            vec![asset("scene-a.tar", 64), asset("scene-a_MTL.xml", 8)],
        ))
        .await;

    let first = h.engine.run_cycle(now()).await.unwrap();
    assert_eq!(first.registered, 1);
    assert_eq!(h.store.put_count.load(Ordering::SeqCst), 2);
    assert_eq!(h.registrar.upsert_count.load(Ordering::SeqCst), 1);

    let second = h.engine.run_cycle(now()).await.unwrap();
    assert_eq!(second.registered, 0);
    assert_eq!(second.skipped, 1);
    // Idempotent transfer: still one put per asset, one upsert per item.
    assert_eq!(h.store.put_count.load(Ordering::SeqCst), 2);
    assert_eq!(h.registrar.upsert_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_failing_scene_does_not_block_siblings() {
    let h = harness();
    h.catalog
        .put_scene(candidate("scene-a", "2024-03-05", vec![asset("a.tar", 16)]))
        .await;
    h.catalog
        .put_scene(candidate("scene-b", "2024-03-05", vec![asset("b.tar", 16)]))
        .await;
    h.catalog
        .put_scene(candidate("scene-c", "2024-03-05", vec![asset("c.tar", 16)]))
        .await;
    h.catalog.fail_ref("https://provider.example/download/a.tar").await;

    let report = h.engine.run_cycle(now()).await.unwrap();

    assert_eq!(report.registered, 2);
    assert_eq!(report.failed, 1);
    assert!(report.first_errors.contains_key("transient"));

    let a = h.ledger.get("scene-a").await.unwrap().unwrap();
    assert_eq!(a.transfer_state, TransferState::Downloading);
    assert_eq!(a.failures, 1);
    for id in ["scene-b", "scene-c"] {
        let record = h.ledger.get(id).await.unwrap().unwrap();
        assert_eq!(record.transfer_state, TransferState::Registered);
    }
}

#[tokio::test]
async fn transient_failure_recovers_on_next_cycle() {
    let h = harness();
    h.catalog
        .put_scene(candidate("scene-a", "2024-03-05", vec![asset("a.tar", 16)]))
        .await;
    h.catalog.fail_ref("https://provider.example/download/a.tar").await;

    let first = h.engine.run_cycle(now()).await.unwrap();
    assert_eq!(first.failed, 1);

    h.catalog.heal_ref("https://provider.example/download/a.tar").await;
    let second = h.engine.run_cycle(now()).await.unwrap();

    assert_eq!(second.registered, 1);
    let record = h.ledger.get("scene-a").await.unwrap().unwrap();
    assert_eq!(record.transfer_state, TransferState::Registered);
    assert_eq!(record.failures, 0);
}

#[tokio::test]
async fn republished_scene_is_redownloaded_and_reregistered() {
    let h = harness();
    h.catalog
        .put_scene(candidate("scene-a", "2024-03-05", vec![asset("a.tar", 16)]))
        .await;

    h.engine.run_cycle(now()).await.unwrap();
    assert_eq!(h.store.put_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.registrar.upsert_count.load(Ordering::SeqCst), 1);

    h.catalog.set_content_hash("scene-a", "hash-scene-a-v2").await;
    let report = h.engine.run_cycle(now()).await.unwrap();

    // Same size and key, but the hash change forces a fresh upload and a
    // fresh registration even though the record had been Registered.
    assert_eq!(report.registered, 1);
    assert_eq!(h.store.put_count.load(Ordering::SeqCst), 2);
    assert_eq!(h.registrar.upsert_count.load(Ordering::SeqCst), 2);

    let record = h.ledger.get("scene-a").await.unwrap().unwrap();
    assert_eq!(record.transfer_state, TransferState::Registered);
    assert_eq!(record.content_hash.as_deref(), Some("hash-scene-a-v2"));
}

#[tokio::test]
async fn failure_budget_excludes_scene_until_reset() {
    let h = harness_with(2);
    h.catalog
        .put_scene(candidate("scene-a", "2024-03-05", vec![asset("a.tar", 16)]))
        .await;
    h.catalog.fail_ref("https://provider.example/download/a.tar").await;

    h.engine.run_cycle(now()).await.unwrap();
    let report = h.engine.run_cycle(now()).await.unwrap();
    assert_eq!(report.exhausted, 1);

    let record = h.ledger.get("scene-a").await.unwrap().unwrap();
    assert_eq!(record.transfer_state, TransferState::Failed);

    // A failed record is excluded from later cycles even when the remote
    // side recovers.
    h.catalog.heal_ref("https://provider.example/download/a.tar").await;
    let fetches_before = h.catalog.fetch_count.load(Ordering::SeqCst);
    let third = h.engine.run_cycle(now()).await.unwrap();
    assert_eq!(third.skipped, 1);
    assert_eq!(h.catalog.fetch_count.load(Ordering::SeqCst), fetches_before);
}

#[tokio::test]
async fn conflict_is_surfaced_and_scene_stays_stored() {
    let h = harness();
    h.catalog
        .put_scene(candidate("scene-a", "2024-03-05", vec![asset("a.tar", 16)]))
        .await;
    h.registrar.conflicts.lock().await.insert("scene-a".to_string());

    let report = h.engine.run_cycle(now()).await.unwrap();

    assert_eq!(report.registered, 0);
    assert_eq!(report.failed, 1);
    assert!(report.first_errors.contains_key("conflict"));

    let record = h.ledger.get("scene-a").await.unwrap().unwrap();
    assert_eq!(record.transfer_state, TransferState::Stored);
}

#[tokio::test]
async fn empty_manifest_leaves_scene_discovered() {
    let h = harness();
    h.catalog.put_scene(candidate("scene-a", "2024-03-05", vec![])).await;

    let report = h.engine.run_cycle(now()).await.unwrap();
    assert_eq!(report.pending, 1);

    let record = h.ledger.get("scene-a").await.unwrap().unwrap();
    assert_eq!(record.transfer_state, TransferState::Discovered);

    // Manifest shows up later; the scene completes.
    h.catalog.set_content_hash("scene-a", "hash-scene-a").await;
    {
        let mut scenes = h.catalog.scenes.lock().await;
        let list = scenes.get_mut(&day("2024-03-05")).unwrap();
        list[0].assets = vec![asset("a.tar", 16)];
    }
    let second = h.engine.run_cycle(now()).await.unwrap();
    assert_eq!(second.registered, 1);
}

#[tokio::test]
async fn scan_covers_the_window_oldest_first_and_nothing_outside() {
    let h = harness();
    // A scene outside the window must never be seen.
    h.catalog
        .put_scene(candidate("scene-old", "2024-02-28", vec![asset("old.tar", 4)]))
        .await;

    let report = h.engine.run_cycle(now()).await.unwrap();
    assert_eq!(report.scenes_seen, 0);

    let days = h.catalog.listed_days.lock().await;
    assert_eq!(days.len(), 31);
    assert_eq!(days[0], day("2024-03-01"));
    assert_eq!(days[30], day("2024-03-31"));
    assert!(days.windows(2).all(|pair| pair[0] < pair[1]));
}
