//! Synchronization engine: decides, for a rolling window of calendar days,
//! which remote scenes are new or changed, transfers their assets into
//! object storage exactly-once-in-effect, and hands stored scenes to the
//! catalog registrar. Safe to re-run after partial failure; every ledger
//! mutation is a compare-and-swap on the record's transfer state.

pub mod error;
pub mod report;
pub mod schedule;
pub mod window;

pub use error::{CycleError, FailureClass, SyncError};
pub use report::{CycleReport, SceneFailure, SceneOutcome};
pub use schedule::Scheduler;
pub use window::RollingWindow;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diagnostics::*;
use ledger::{LedgerStore, SceneRecord, TransferState};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// Scene fragment returned by a window scan. The provider may report an
/// incomplete asset manifest while downloads are still being staged.
#[derive(Debug, Clone)]
pub struct SceneCandidate {
    pub scene_id: String,
    pub dataset: String,
    pub acquisition_date: NaiveDate,
    pub assets: Vec<ledger::AssetSpec>,
    pub content_hash: Option<String>,
    pub geometry: Option<serde_json::Value>,
    pub bbox: Option<[f64; 4]>,
}

/// Remote imagery provider, seen from the engine.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Scenes acquired on `day`. Implementations tolerate partial pages and
    /// must not assume a stable total count across retries.
    async fn list_scenes(
        &self,
        dataset: &str,
        day: NaiveDate,
    ) -> Result<Vec<SceneCandidate>, SyncError>;

    /// Download one asset into `dest`, returning the bytes written.
    async fn fetch_asset(&self, remote_ref: &str, dest: &Path) -> Result<u64, SyncError>;
}

/// Object storage, seen from the engine.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Whether `key` is already present (with the expected size, when one
    /// is given). Presence with a wrong size must read as absent.
    async fn exists(&self, key: &str, expected_size: Option<u64>) -> Result<bool, SyncError>;

    async fn put_file(&self, path: &Path, key: &str) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created,
    /// An identical item already existed; success for idempotency purposes.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub item_id: String,
    pub outcome: RegistrationOutcome,
}

/// Catalog registrar, seen from the engine. Callers only hand over records
/// that are `Stored` or later.
#[async_trait]
pub trait CatalogRegistrar: Send + Sync {
    async fn upsert(&self, scene: &SceneRecord) -> Result<Registration, SyncError>;
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Days back from `now` included in each scan, in addition to today.
    pub window_days: u32,
    /// Consecutive failed cycles before a scene is excluded.
    pub max_scene_failures: u32,
    /// Worker-pool width for scene transfers within one day.
    pub parallel_transfers: usize,
    /// Scratch space for in-flight downloads.
    pub working_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            window_days: 30,
            max_scene_failures: 5,
            parallel_transfers: 10,
            working_dir: PathBuf::from("workdir"),
        }
    }
}

/// Shared collaborator handles for scene tasks.
struct CycleContext {
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn RemoteCatalog>,
    store: Arc<dyn AssetStore>,
    registrar: Arc<dyn CatalogRegistrar>,
    max_scene_failures: u32,
    working_dir: PathBuf,
}

pub struct SyncEngine {
    context: Arc<CycleContext>,
    datasets: Vec<String>,
    config: EngineConfig,
    /// Guards against two cycles racing on the same ledger.
    cycle_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        catalog: Arc<dyn RemoteCatalog>,
        store: Arc<dyn AssetStore>,
        registrar: Arc<dyn CatalogRegistrar>,
        datasets: Vec<String>,
        config: EngineConfig,
    ) -> Self {
        let context = Arc::new(CycleContext {
            ledger,
            catalog,
            store,
            registrar,
            max_scene_failures: config.max_scene_failures,
            working_dir: config.working_dir.clone(),
        });
        SyncEngine {
            context,
            datasets,
            config,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one synchronization cycle for the rolling window ending at `now`.
    ///
    /// Per-scene and per-day failures are isolated and summarized in the
    /// report; only configuration-class failures abort the cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| CycleError::CycleInProgress)?;

        let window = RollingWindow::compute(now, self.config.window_days);
        let span = format!("{}..{}", window.start(), window.end());
        info!("Starting synchronization cycle for window {span}");

        tokio::fs::create_dir_all(&self.config.working_dir)
            .await
            .map_err(|e| CycleError::Fatal(format!("cannot create working directory: {e}")))?;

        let mut report = CycleReport::new(window.start(), window.end());

        for day in window.days() {
            let day_label = day.to_string();
            for dataset in &self.datasets {
                let candidates = match self.context.catalog.list_scenes(dataset, day).await {
                    Ok(candidates) => candidates,
                    Err(SyncError::Config(message)) => {
                        error!("Aborting cycle: {message}");
                        return Err(CycleError::Fatal(message));
                    }
                    Err(e) => {
                        let message = e.to_string();
                        warn!("Scene listing failed for {dataset} on {day_label}: {message}");
                        report.record_error(e.classify(), &message);
                        continue;
                    }
                };

                let count = candidates.len();
                report.scenes_seen += count;
                if count > 0 {
                    info!("Found {count} scenes for {dataset} on {day_label}");
                }

                // One task per scene; all of a day's scenes join before the
                // next day starts, keeping registration chronological.
                let semaphore = Arc::new(Semaphore::new(self.config.parallel_transfers));
                let mut tasks = JoinSet::new();
                for candidate in candidates {
                    let context = self.context.clone();
                    let semaphore = semaphore.clone();
                    tasks.spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .expect("cycle semaphore closed");
                        process_scene(context, candidate).await
                    });
                }

                while let Some(joined) = tasks.join_next().await {
                    match joined {
                        Ok(outcome) => report.tally(&outcome),
                        Err(e) => {
                            let message = format!("scene task aborted: {e}");
                            error!("{message}");
                            report.record_error(FailureClass::Transient, &message);
                        }
                    }
                }
            }
        }

        let summary = report.to_string();
        info!("Cycle complete: {summary}");
        Ok(report)
    }
}

/// Drive one scene as far through the lifecycle as this cycle can take it.
async fn process_scene(context: Arc<CycleContext>, candidate: SceneCandidate) -> SceneOutcome {
    let scene_id = candidate.scene_id.clone();
    let mut outcome = SceneOutcome::new(&scene_id);

    if let Err(err) = sync_scene(&context, candidate, &mut outcome).await {
        let failure = note_failure(&context, &scene_id, &err, &mut outcome).await;
        outcome.failure = failure;
    }

    outcome
}

async fn sync_scene(
    context: &CycleContext,
    candidate: SceneCandidate,
    outcome: &mut SceneOutcome,
) -> Result<(), SyncError> {
    let scene_id = candidate.scene_id.clone();

    let mut record = match context.ledger.get(&scene_id).await? {
        Some(existing) => existing,
        None => {
            let record = record_from_candidate(&candidate);
            context.ledger.insert(record.clone()).await?;
            outcome.newly_discovered = true;
            info!("Discovered scene {scene_id}");
            record
        }
    };

    // Re-publication: a changed content hash resets the record no matter how
    // far it had progressed. This is the sole regression path.
    if candidate.content_hash.is_some() && record.content_hash != candidate.content_hash {
        let previous = record.transfer_state;
        record.reset_for_rescan(candidate.content_hash.clone(), candidate.assets.clone());
        record.geometry = candidate.geometry.clone();
        record.bbox = candidate.bbox;
        context
            .ledger
            .compare_and_swap(&scene_id, previous, record.clone())
            .await?;
        let previous_state = previous.to_string();
        info!("Scene {scene_id} was re-published; reset from {previous_state} for re-scan");
    } else if record.transfer_state == TransferState::Discovered
        && !candidate.assets.is_empty()
        && record.assets != candidate.assets
    {
        // The provider finished staging more downloads since last scan.
        record.assets = candidate.assets.clone();
        context
            .ledger
            .compare_and_swap(&scene_id, TransferState::Discovered, record.clone())
            .await?;
    }

    match record.transfer_state {
        TransferState::Failed | TransferState::Registered => {
            outcome.skipped = true;
            Ok(())
        }
        TransferState::Stored => register_scene(context, &mut record, outcome).await,
        TransferState::Discovered | TransferState::Downloading => {
            if record.assets.is_empty() {
                // Not yet available; try again next cycle.
                outcome.pending = true;
                return Ok(());
            }
            transfer_scene(context, &mut record, outcome).await?;
            register_scene(context, &mut record, outcome).await
        }
    }
}

fn record_from_candidate(candidate: &SceneCandidate) -> SceneRecord {
    let mut record = SceneRecord::discovered(
        &candidate.scene_id,
        &candidate.dataset,
        candidate.acquisition_date,
    );
    record.assets = candidate.assets.clone();
    record.content_hash = candidate.content_hash.clone();
    record.geometry = candidate.geometry.clone();
    record.bbox = candidate.bbox;
    record
}

/// Transfer every manifest asset into object storage, skipping objects the
/// store already holds at the right size, then mark the record `Stored`.
async fn transfer_scene(
    context: &CycleContext,
    record: &mut SceneRecord,
    outcome: &mut SceneOutcome,
) -> Result<(), SyncError> {
    let scene_id = record.scene_id.clone();

    if record.transfer_state == TransferState::Discovered {
        let mut updated = record.clone();
        updated.transfer_state = TransferState::Downloading;
        context
            .ledger
            .compare_and_swap(&scene_id, TransferState::Discovered, updated.clone())
            .await?;
        *record = updated;
    }

    let scratch = tempfile::tempdir_in(&context.working_dir)
        .map_err(|e| SyncError::Transient(format!("cannot create scratch directory: {e}")))?;

    for asset in &record.assets {
        let key = record.object_key(asset);

        if !record.force_refetch && context.store.exists(&key, Some(asset.size)).await? {
            debug!("Object {key} already stored, skipping");
            continue;
        }

        let dest = scratch.path().join(&asset.name);
        let remote_ref = asset.remote_ref.clone();
        debug!("Fetching {remote_ref} into scratch for {key}");
        let written = context.catalog.fetch_asset(&asset.remote_ref, &dest).await?;
        if written != asset.size {
            return Err(SyncError::SizeMismatch {
                key,
                expected: asset.size,
                actual: written,
            });
        }

        context.store.put_file(&dest, &key).await?;
        let _ = tokio::fs::remove_file(&dest).await;
        info!("Stored object {key} ({written} bytes)");
    }

    let mut updated = record.clone();
    updated.transfer_state = TransferState::Stored;
    updated.force_refetch = false;
    updated.last_error = None;
    context
        .ledger
        .compare_and_swap(&scene_id, TransferState::Downloading, updated.clone())
        .await?;
    *record = updated;
    outcome.newly_stored = true;
    info!("Scene {scene_id} fully stored");
    Ok(())
}

/// Hand a `Stored` record to the registrar and mark it `Registered`.
async fn register_scene(
    context: &CycleContext,
    record: &mut SceneRecord,
    outcome: &mut SceneOutcome,
) -> Result<(), SyncError> {
    let scene_id = record.scene_id.clone();
    let registration = context.registrar.upsert(record).await?;

    let mut updated = record.clone();
    updated.transfer_state = TransferState::Registered;
    updated.item_id = Some(registration.item_id.clone());
    updated.failures = 0;
    updated.last_error = None;
    context
        .ledger
        .compare_and_swap(&scene_id, TransferState::Stored, updated.clone())
        .await?;
    *record = updated;
    outcome.newly_registered = true;

    let item_id = registration.item_id;
    match registration.outcome {
        RegistrationOutcome::Created => info!("Registered scene {scene_id} as item {item_id}"),
        RegistrationOutcome::Unchanged => {
            debug!("Item {item_id} already registered with identical content")
        }
    }
    Ok(())
}

/// Book-keep a scene failure: bump the consecutive-failure counter and mark
/// the record `Failed` once the budget is spent. Not-found is "not yet
/// available" and spends no budget.
async fn note_failure(
    context: &CycleContext,
    scene_id: &str,
    err: &SyncError,
    outcome: &mut SceneOutcome,
) -> Option<SceneFailure> {
    let class = err.classify();
    let message = err.to_string();
    warn!("Scene {scene_id} failed ({message})");

    if class == FailureClass::NotFound {
        outcome.pending = true;
        return None;
    }

    let mut exhausted = false;
    match context.ledger.get(scene_id).await {
        Ok(Some(mut record)) if !record.transfer_state.is_terminal() => {
            let previous = record.transfer_state;
            record.failures += 1;
            record.last_error = Some(message.clone());
            if record.failures >= context.max_scene_failures {
                record.transfer_state = TransferState::Failed;
                exhausted = true;
                let failures = record.failures;
                error!(
                    "Scene {scene_id} exceeded {failures} consecutive failures; excluding until manual reset"
                );
            }
            if let Err(e) = context
                .ledger
                .compare_and_swap(scene_id, previous, record)
                .await
            {
                let detail = e.to_string();
                warn!("Could not record failure for scene {scene_id}: {detail}");
            }
        }
        Ok(_) => {}
        Err(e) => {
            let detail = e.to_string();
            warn!("Could not load scene {scene_id} for failure bookkeeping: {detail}");
        }
    }

    Some(SceneFailure {
        class,
        message,
        exhausted,
    })
}
