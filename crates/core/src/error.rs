//! Error taxonomy for the pipeline.
//!
//! All four domain errors are fatal within a run: the operator fixes the
//! underlying cause and re-invokes, and reconciliation skips work that was
//! already checkpointed.

use crate::ItemKey;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the pipeline core.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Required persisted file or table is absent or invalid. Raised before
    /// any resource discovery.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No free compute device. There is no single-device fallback.
    #[error("no free compute device: {detected} detected, all busy")]
    ResourceUnavailable { detected: usize },

    /// Identity fields could not be derived from source metadata. Names the
    /// offending source.
    #[error("data integrity error in {source_name}: {reason}")]
    DataIntegrity { source_name: String, reason: String },

    /// An external invocation exited non-zero, or wrote to its error stream
    /// even on a success exit. Aborts the remaining chunks of the current
    /// stage.
    #[error("external tool failed on {item} (device {device}, exit {exit_code}): {output}")]
    ExternalTool {
        item: ItemKey,
        device: String,
        exit_code: i32,
        output: String,
    },

    /// I/O error outside the storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the metadata store.
    #[error("storage error: {0}")]
    Storage(String),
}
