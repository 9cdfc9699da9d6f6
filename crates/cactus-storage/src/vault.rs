//! Persisted session state.

use crate::{SecureStorage, StorageError, StorageKeys, StorageResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// How the session was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Password,
    ExternalIdentity,
}

/// Metadata describing the persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// App Services user id
    pub user_id: String,
    /// Normalized email, when known
    #[serde(default)]
    pub email: Option<String>,
    pub credential_kind: CredentialKind,
    /// Device id assigned by the auth service
    #[serde(default)]
    pub device_id: Option<String>,
    /// When the session was established (RFC 3339)
    pub signed_in_at: String,
}

/// Configuration needed to (re)open a user's store.
///
/// Supplied after login and retained so the store can be opened offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfiguration {
    pub app_id: String,
    pub user_id: String,
    pub base_url: String,
    /// Whether the store was configured for partial (subscription-based) sync
    #[serde(default = "default_flexible_sync")]
    pub flexible_sync: bool,
}

fn default_flexible_sync() -> bool {
    true
}

/// Everything written on sign-in.
#[derive(Debug, Clone)]
pub struct PersistedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub meta: SessionMeta,
    pub store: StoreConfiguration,
}

/// High-level API over a [`SecureStorage`] backend.
pub struct SessionVault {
    storage: Box<dyn SecureStorage>,
}

impl SessionVault {
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Persist a full session (tokens, metadata and store configuration).
    pub fn save(&self, session: &PersistedSession) -> StorageResult<()> {
        self.storage
            .set(StorageKeys::ACCESS_TOKEN, &session.access_token)?;
        self.storage
            .set(StorageKeys::REFRESH_TOKEN, &session.refresh_token)?;
        self.set_json(StorageKeys::SESSION_META, &session.meta)?;
        self.set_json(StorageKeys::STORE_CONFIGURATION, &session.store)?;
        tracing::debug!(user_id = %session.meta.user_id, "Session persisted");
        Ok(())
    }

    /// Load the persisted session, if complete.
    ///
    /// A partially written session (any key missing) reads as `None`.
    pub fn load(&self) -> StorageResult<Option<PersistedSession>> {
        let access_token = match self.storage.get(StorageKeys::ACCESS_TOKEN)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let refresh_token = match self.storage.get(StorageKeys::REFRESH_TOKEN)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let meta = match self.session_meta()? {
            Some(m) => m,
            None => return Ok(None),
        };
        let store = match self.store_configuration()? {
            Some(s) => s,
            None => return Ok(None),
        };

        Ok(Some(PersistedSession {
            access_token,
            refresh_token,
            meta,
            store,
        }))
    }

    /// Whether a complete session is persisted.
    pub fn has_session(&self) -> StorageResult<bool> {
        for key in StorageKeys::ALL {
            if !self.storage.has(key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn session_meta(&self) -> StorageResult<Option<SessionMeta>> {
        self.get_json(StorageKeys::SESSION_META)
    }

    /// Last-used store configuration.
    pub fn store_configuration(&self) -> StorageResult<Option<StoreConfiguration>> {
        self.get_json(StorageKeys::STORE_CONFIGURATION)
    }

    pub fn access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    /// Remove every key the vault owns. Missing keys are not an error.
    pub fn clear(&self) -> StorageResult<()> {
        for key in StorageKeys::ALL {
            self.storage.delete(key)?;
        }
        tracing::debug!("Session vault cleared");
        Ok(())
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let json =
            serde_json::to_string(value).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(key, &json)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.storage.get(key)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StorageError::Encoding(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }
}
