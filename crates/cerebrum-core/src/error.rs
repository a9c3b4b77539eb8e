//! Error taxonomy for the cognition core.
//!
//! Each subsystem gets its own `thiserror` enum so callers can match on the
//! failure mode that actually matters to them (e.g. ingest callers care
//! about [`IngestError`], store callers about [`StoreError`]). [`CoreError`]
//! aggregates them for the orchestrator boundary, where a single `Result`
//! type is more convenient than threading six error types through channels.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Aggregate error surfaced at the orchestrator / CLI boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("signal buffer error: {0}")]
    Signal(#[from] crate::signals::SignalError),

    #[error("ingest error: {0}")]
    Ingest(#[from] crate::ingest::IngestError),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether the failure is transient and safe to retry (store busy,
    /// queue full) versus a hard failure that should surface to the user.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Store(e) if e.is_transient())
    }
}
