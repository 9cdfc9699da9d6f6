//! Persisted session storage for Cactus.
//!
//! Provides a key/value [`SecureStorage`] abstraction with a JSON-file
//! backend for real use and an in-memory backend for tests, plus the
//! [`SessionVault`] that stores tokens, session metadata and the last-used
//! store configuration.

mod file;
mod keys;
mod memory;
mod traits;
mod vault;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;
pub use vault::{CredentialKind, PersistedSession, SessionMeta, SessionVault, StoreConfiguration};

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a vault backed by a JSON file.
pub fn open_file_vault(path: &Path) -> StorageResult<SessionVault> {
    let storage = FileStorage::new(path)?;
    Ok(SessionVault::new(Box::new(storage)))
}

/// Create a vault that lives only as long as the process.
pub fn memory_vault() -> SessionVault {
    SessionVault::new(Box::new(MemoryStorage::new()))
}
