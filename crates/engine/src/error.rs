use thiserror::Error;

/// System-wide error taxonomy for synchronization work.
///
/// Collaborator implementations map their internal errors onto these
/// variants at the port boundary; the engine only ever reasons about the
/// classification, never about transport detail.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network/API trouble worth retrying on a later cycle.
    #[error("transient I/O failure: {0}")]
    Transient(String),

    /// A resource that is expected to appear but has not yet.
    #[error("not yet available: {0}")]
    NotFound(String),

    /// Catalog identity collision with differing content. Fatal for the
    /// item; never auto-resolved.
    #[error("catalog conflict for item {item_id}: {detail}")]
    Conflict { item_id: String, detail: String },

    /// Downloaded byte count disagreed with the provider manifest.
    #[error("size mismatch for {key}: expected {expected} bytes, wrote {actual}")]
    SizeMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// Credentials or endpoints rejected outright; aborts the cycle.
    #[error("configuration rejected: {0}")]
    Config(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),
}

/// Failure classes reported in the cycle summary, one first-error each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureClass {
    Transient,
    NotFound,
    Conflict,
    Ledger,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::NotFound => "not-found",
            FailureClass::Conflict => "conflict",
            FailureClass::Ledger => "ledger",
        }
    }
}

impl SyncError {
    pub fn classify(&self) -> FailureClass {
        match self {
            SyncError::Transient(_) | SyncError::SizeMismatch { .. } | SyncError::Config(_) => {
                FailureClass::Transient
            }
            SyncError::NotFound(_) => FailureClass::NotFound,
            SyncError::Conflict { .. } => FailureClass::Conflict,
            SyncError::Ledger(_) => FailureClass::Ledger,
        }
    }
}

/// Cycle-level failures. Everything scene-scoped stays inside the report.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a synchronization cycle is already running")]
    CycleInProgress,

    #[error("cycle aborted: {0}")]
    Fatal(String),
}
