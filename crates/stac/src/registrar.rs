use async_trait::async_trait;
use diagnostics::*;
use serde_json::Value;

use ledger::{SceneRecord, TransferState};

use crate::canonical::canonical_hash;
use crate::client::{CatalogClient, CreateOutcome};
use crate::item::build_item;
use crate::{CatalogError, RegistrarError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    /// The catalog already holds an identical item; success.
    Unchanged,
}

/// Builds catalog items from stored scenes and upserts them.
pub struct Registrar {
    client: CatalogClient,
    /// Base URL the relay serves on; becomes the asset href host.
    download_host: String,
}

impl Registrar {
    pub fn new(client: CatalogClient, download_host: impl Into<String>) -> Self {
        Registrar {
            client,
            download_host: download_host.into(),
        }
    }

    /// Create-or-verify upsert for one stored scene.
    ///
    /// Registration before the scene is `Stored` is a programming error and
    /// is refused. An existing item with different canonical content is a
    /// conflict and the catalog document is left untouched.
    pub async fn upsert(
        &self,
        record: &SceneRecord,
    ) -> Result<(String, UpsertOutcome), RegistrarError> {
        if record.transfer_state < TransferState::Stored {
            return Err(RegistrarError::NotStored {
                scene_id: record.scene_id.clone(),
            });
        }

        let item = build_item(record, &self.download_host);
        let item_id = item.id.clone();
        let document = serde_json::to_value(&item)?;

        match self.client.create_item(&item.collection, &document).await? {
            CreateOutcome::Created => {
                info!("Created catalog item {item_id}");
                Ok((item_id, UpsertOutcome::Created))
            }
            CreateOutcome::AlreadyExists => {
                let existing = self
                    .client
                    .get_item(&item.collection, &item_id)
                    .await?
                    .ok_or_else(|| {
                        // Conflicted on create but gone on read: another
                        // actor is mutating this id, try again next cycle.
                        CatalogError::NotFound(format!("item {item_id} vanished after conflict"))
                    })?;

                let existing_hash = canonical_hash(&comparable_view(&existing))?;
                let candidate_hash = canonical_hash(&comparable_view(&document))?;

                if existing_hash == candidate_hash {
                    debug!("Catalog item {item_id} already present with identical content");
                    Ok((item_id, UpsertOutcome::Unchanged))
                } else {
                    Err(RegistrarError::Conflict {
                        item_id,
                        existing_hash,
                        candidate_hash,
                    })
                }
            }
        }
    }
}

/// The authored projection of an item document.
///
/// Catalogs decorate stored items with their own fields (self links, server
/// timestamps); equality is judged only over the fields this registrar
/// writes.
fn comparable_view(document: &Value) -> Value {
    let mut view = serde_json::Map::new();
    for key in ["id", "collection", "geometry", "bbox", "properties", "assets"] {
        if let Some(value) = document.get(key) {
            if !value.is_null() {
                view.insert(key.to_string(), value.clone());
            }
        }
    }
    Value::Object(view)
}

impl From<RegistrarError> for engine::SyncError {
    fn from(err: RegistrarError) -> Self {
        match err {
            RegistrarError::Conflict { ref item_id, .. } => engine::SyncError::Conflict {
                item_id: item_id.clone(),
                detail: err.to_string(),
            },
            RegistrarError::Catalog(CatalogError::Auth(detail)) => engine::SyncError::Config(detail),
            RegistrarError::Catalog(CatalogError::NotFound(what)) => engine::SyncError::NotFound(what),
            other => engine::SyncError::Transient(other.to_string()),
        }
    }
}

#[async_trait]
impl engine::CatalogRegistrar for Registrar {
    async fn upsert(&self, scene: &SceneRecord) -> Result<engine::Registration, engine::SyncError> {
        let (item_id, outcome) = Registrar::upsert(self, scene).await?;
        let outcome = match outcome {
            UpsertOutcome::Created => engine::RegistrationOutcome::Created,
            UpsertOutcome::Unchanged => engine::RegistrationOutcome::Unchanged,
        };
        Ok(engine::Registration { item_id, outcome })
    }
}
