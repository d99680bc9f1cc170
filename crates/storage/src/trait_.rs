//! Metadata store abstraction.

use async_trait::async_trait;
use tomopipe_core::{DoneTable, PipelineError};

/// Error type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while loading or checkpointing a done table.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Table file exists but its contents are not usable
    #[error("corrupt table {table}: {reason}")]
    Corrupt { table: String, reason: String },
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

/// Store abstraction for per-stage done tables.
///
/// One run has exactly one writer, so implementations need no locking
/// discipline; they do need atomic checkpoint writes so a crash never leaves
/// a half-written table behind.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load a stage's done table. An absent table is an empty table.
    async fn load_done(&self, table: &str) -> Result<DoneTable>;

    /// Persist the full table atomically. Called after every completed item.
    async fn checkpoint(&mut self, table: &str, done: &DoneTable) -> Result<()>;
}
