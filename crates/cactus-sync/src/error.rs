//! Sync error types.

use thiserror::Error;

/// Errors raised while opening stores or mutating subscriptions.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Subscription set is not bound to an opened store
    #[error("Subscription set for '{0}' is not attached to a store")]
    NotAttached(String),

    /// The base subscription cannot be removed or replaced by name
    #[error("Refusing to modify base subscription '{0}'")]
    BaseSubscription(String),

    /// Subscription update transaction failed
    #[error("Subscription transaction failed: {0}")]
    Transaction(String),

    /// Store could not be opened in time
    #[error("Store open timed out after {0} ms")]
    Timeout(u64),

    /// Store configuration unusable
    #[error("Bad store configuration: {0}")]
    Configuration(String),

    /// Object lookup failed
    #[error("Object '{id}' not found in '{collection}'")]
    ObjectNotFound { collection: String, id: String },

    /// Object payload is not a JSON object
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Opening protocol ended without a verdict
    #[error("Store opening stream closed before completion")]
    StreamClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Transport-level failures that a later attempt could get past.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Timeout(_) | SyncError::Transaction(_) | SyncError::StreamClosed
        )
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
