//! Scene ledger: the durable record of which remote scenes have been
//! transferred and registered.
//!
//! The ledger is the single shared mutable resource of the pipeline. All
//! mutations go through [`LedgerStore::compare_and_swap`], keyed on the
//! record's current transfer state, so that discovery, transfer and
//! registration steps cannot lose each other's updates.

pub mod model;
pub mod store;

pub use model::{AssetSpec, SceneRecord, TransferState};
pub use store::{FileLedger, LedgerStore, MemoryLedger};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("scene {scene_id} already present in ledger")]
    DuplicateScene { scene_id: String },

    #[error("scene {scene_id} not present in ledger")]
    UnknownScene { scene_id: String },

    #[error(
        "state conflict for scene {scene_id}: expected {expected:?}, found {actual:?}"
    )]
    StateConflict {
        scene_id: String,
        expected: TransferState,
        actual: TransferState,
    },
}
