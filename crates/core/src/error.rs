//! Error types for the presentation pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across the build, enhancement, and export pipeline.
///
/// Per-asset and per-format failures are collected by callers into partial
/// results; only `Validation` and unrecoverable store errors abort a whole
/// operation.
#[derive(Error, Debug)]
pub enum Error {
    /// The request shape was malformed. Rejected before any side effect.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Fetching declared asset bytes from a remote source failed.
    /// Recoverable: the pipeline degrades to a placeholder asset.
    #[error("Asset fetch failed: {0}")]
    AssetFetch(String),

    /// The upstream generation collaborator failed to produce asset bytes.
    /// Recoverable: the pipeline degrades to a placeholder asset.
    #[error("Asset generation failed: {0}")]
    AssetGeneration(String),

    /// One export format failed. Isolated: other formats still succeed.
    #[error("Export to {format} failed: {message}")]
    ExportFormat { format: String, message: String },

    /// A write to the object store or catalog failed. Writes are idempotent,
    /// so retrying is always safe.
    #[error("Store write failed: {0}")]
    StoreWrite(String),

    /// A read from the object store or catalog failed.
    #[error("Store read failed: {0}")]
    StoreRead(String),

    /// A concurrent mutation was detected. The caller must re-read and retry.
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// The requested presentation, version, or artifact does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An external collaborator call exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Cache layer failure. Never propagated to callers; always downgraded
    /// to a cache miss at the call site.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A background task failed to complete.
    #[error("Task failed: {0}")]
    Internal(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ZIP container error (for PPTX artifacts).
    #[error("ZIP error: {0}")]
    Zip(String),

    /// XML error (for PPTX artifacts).
    #[error("XML error: {0}")]
    Xml(String),
}

impl Error {
    /// Whether the failed operation can safely be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreWrite(_) | Error::AssetFetch(_) | Error::Timeout(_)
        )
    }

    /// Whether this failure degrades an asset rather than aborting the slide.
    pub fn degrades_asset(&self) -> bool {
        matches!(
            self,
            Error::AssetFetch(_) | Error::AssetGeneration(_) | Error::Timeout(_)
        )
    }
}
