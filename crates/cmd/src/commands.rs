use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use diagnostics::*;
use engine::{EngineConfig, Scheduler, SyncEngine};
use ledger::{FileLedger, LedgerStore, TransferState};

use crate::config::SyncConfig;

/// Wire the collaborators into a ready synchronization engine.
async fn build_engine(config: &SyncConfig) -> Result<SyncEngine> {
    let region_geojson = match &config.provider.region_geojson {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read region GeoJSON: {}", path.display()))?;
            Some(
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid GeoJSON in {}", path.display()))?,
            )
        }
        None => None,
    };

    let provider_client = provider::Client::login(provider::ProviderConfig {
        endpoint: config.provider.endpoint.clone(),
        username: config.provider.username.clone(),
        token: config.provider.token.clone(),
        region_geojson,
        timeout_secs: config.provider.timeout_secs,
        max_retries: config.provider.max_retries,
    })
    .await
    .context("Failed to log in to the imagery provider")?;

    let object_store = store::ObjectStore::new(store::StoreConfig {
        endpoint: config.storage.endpoint.clone(),
        region: config.storage.region.clone(),
        bucket: config.storage.bucket.clone(),
        access_key: config.storage.access_key.clone(),
        secret_key: config.storage.secret_key.clone(),
        path_style: config.storage.path_style,
    })
    .context("Failed to create the object store client")?;

    let catalog_client = stac::CatalogClient::new(stac::CatalogConfig {
        endpoint: config.catalog.endpoint.clone(),
        username: config.catalog.username.clone(),
        password: config.catalog.password.clone(),
        timeout_secs: config.catalog.timeout_secs,
        max_retries: config.catalog.max_retries,
    })
    .context("Failed to create the catalog client")?;
    let registrar = stac::Registrar::new(catalog_client, config.catalog.download_host.clone());

    let scene_ledger = FileLedger::open(&config.engine.ledger_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open scene ledger at {}",
                config.engine.ledger_path.display()
            )
        })?;

    Ok(SyncEngine::new(
        Arc::new(scene_ledger),
        Arc::new(provider_client),
        Arc::new(object_store),
        Arc::new(registrar),
        config.provider.datasets.clone(),
        EngineConfig {
            window_days: config.engine.window_days,
            max_scene_failures: config.engine.max_scene_failures,
            parallel_transfers: config.engine.parallel_transfers,
            working_dir: config.engine.working_dir.clone(),
        },
    ))
}

/// Run a single synchronization cycle and print the report.
pub async fn run_command(config: &SyncConfig) -> Result<()> {
    let sync_engine = build_engine(config).await?;
    let report = sync_engine
        .run_cycle(Utc::now())
        .await
        .context("Synchronization cycle failed")?;

    println!("{report}");
    for (class, message) in &report.first_errors {
        println!("  first {class} error: {message}");
    }
    Ok(())
}

/// Run-then-wait daily loop: one cycle immediately, then one per day at the
/// configured wall-clock time. A failed cycle waits `retry_wait_secs` and
/// tries again instead of losing the day.
pub async fn daemon_command(config: &SyncConfig) -> Result<()> {
    let sync_engine = build_engine(config).await?;
    let scheduler = Scheduler::new(config.engine.run_at()?);
    let retry_wait = Duration::from_secs(config.engine.retry_wait_secs);

    info!("=== SYNC DAEMON STARTED ===");
    loop {
        let cycle = tokio::select! {
            result = sync_engine.run_cycle(Utc::now()) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        match cycle {
            None => {
                info!("Shutdown requested; in-flight scenes resume on the next run");
                return Ok(());
            }
            Some(Ok(report)) => {
                let summary = report.to_string();
                info!("{summary}");
            }
            Some(Err(e)) => {
                let detail = e.to_string();
                let wait = retry_wait.as_secs();
                error!("Cycle failed: {detail}. Retrying in {wait} seconds");
                tokio::select! {
                    _ = tokio::time::sleep(retry_wait) => continue,
                    _ = tokio::signal::ctrl_c() => return Ok(()),
                }
            }
        }

        let now = Utc::now();
        let next_run = scheduler.next_run_after(now);
        let sleep_for = (next_run - now).to_std().unwrap_or(Duration::ZERO);
        let next_label = next_run.to_rfc3339();
        info!("All synchronized. Next cycle at {next_label}");

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                return Ok(());
            }
        }
    }
}

/// Serve the signed-reference relay until interrupted.
pub async fn relay_command(config: &SyncConfig) -> Result<()> {
    let object_store = store::ObjectStore::new(store::StoreConfig {
        endpoint: config.storage.endpoint.clone(),
        region: config.storage.region.clone(),
        bucket: config.storage.bucket.clone(),
        access_key: config.storage.access_key.clone(),
        secret_key: config.storage.secret_key.clone(),
        path_style: config.storage.path_style,
    })
    .context("Failed to create the object store client")?;

    let service = Arc::new(relay::RelayService::new(
        Arc::new(object_store),
        config.relay.url_ttl_secs,
    ));
    let addr = config.relay.bind_addr()?;

    println!("Relay listening on {addr}");
    tokio::select! {
        _ = relay::serve(service, addr) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Relay shutting down");
        }
    }
    Ok(())
}

/// Manually reset a scene (typically `Failed`) back to `Discovered` so the
/// next cycle picks it up again.
pub async fn reset_command(config: &SyncConfig, scene_id: &str) -> Result<()> {
    let scene_ledger = FileLedger::open(&config.engine.ledger_path).await?;

    let Some(mut record) = scene_ledger.get(scene_id).await? else {
        bail!("Scene {scene_id} is not in the ledger");
    };

    let previous = record.transfer_state;
    record.transfer_state = TransferState::Discovered;
    record.failures = 0;
    record.last_error = None;
    scene_ledger
        .compare_and_swap(scene_id, previous, record)
        .await
        .context("Ledger update failed")?;

    println!("Scene {scene_id} reset from {previous} to discovered");
    Ok(())
}

/// Print per-state ledger counts and any failed scenes.
pub async fn status_command(config: &SyncConfig) -> Result<()> {
    let scene_ledger = FileLedger::open(&config.engine.ledger_path).await?;
    let records = scene_ledger.list_all().await?;

    let mut counts = std::collections::BTreeMap::new();
    for record in &records {
        *counts.entry(record.transfer_state).or_insert(0usize) += 1;
    }

    println!("{} scenes in ledger", records.len());
    for (state, count) in counts {
        println!("  {state}: {count}");
    }

    for record in records
        .iter()
        .filter(|r| r.transfer_state == TransferState::Failed)
    {
        let scene_id = &record.scene_id;
        let error = record.last_error.as_deref().unwrap_or("unknown error");
        println!("  failed: {scene_id} ({error})");
    }
    Ok(())
}
