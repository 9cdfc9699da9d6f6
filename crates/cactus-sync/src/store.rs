//! Store handles and the opening protocol.

use crate::{Filter, SubscriptionRegistry, SyncError, SyncResult};
use async_trait::async_trait;
use cactus_storage::StoreConfiguration;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Field holding an object's primary key.
pub const ID_FIELD: &str = "_id";

/// Field holding the id of the user that owns an object.
pub const OWNER_FIELD: &str = "owner_id";

/// An opened store.
///
/// Handed to consumers by reference (`Arc`) for reading; the session core
/// owns its lifetime.
#[async_trait]
pub trait StoreHandle: Send + Sync {
    fn configuration(&self) -> &StoreConfiguration;

    /// Registry that subscription sets attach to.
    fn subscriptions(&self) -> Arc<dyn SubscriptionRegistry>;

    /// Whether the store is connected to sync (false for offline snapshots).
    fn is_synced(&self) -> bool;

    /// Insert an object, assigning an `_id` when missing. Returns the id.
    async fn insert(&self, collection: &str, object: Value) -> SyncResult<String>;

    /// Objects in `collection` matching `filter`.
    async fn objects(&self, collection: &str, filter: &Filter) -> SyncResult<Vec<Value>>;

    /// Merge the fields of `patch` into the object with the given id.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> SyncResult<()>;

    /// Delete by id, returning whether the object existed.
    async fn delete(&self, collection: &str, id: &str) -> SyncResult<bool>;

    /// Single object by id.
    async fn object(&self, collection: &str, id: &str) -> SyncResult<Option<Value>> {
        Ok(self
            .objects(collection, &Filter::eq(ID_FIELD, id))
            .await?
            .into_iter()
            .next())
    }
}

/// Reassign an object to another owner.
pub async fn transfer_ownership(
    store: &dyn StoreHandle,
    collection: &str,
    id: &str,
    new_owner: &str,
) -> SyncResult<()> {
    store
        .update(collection, id, json!({ OWNER_FIELD: new_owner }))
        .await?;
    tracing::debug!(collection, id, new_owner, "Ownership transferred");
    Ok(())
}

/// Progress of a synced-store open.
pub enum OpenEvent {
    Connecting,
    WaitingForCredential,
    /// Initial download progress in `0.0..=1.0`.
    Progress(f64),
    Opened(Arc<dyn StoreHandle>),
    Failed(SyncError),
}

impl OpenEvent {
    /// `Opened` and `Failed` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OpenEvent::Opened(_) | OpenEvent::Failed(_))
    }
}

impl fmt::Debug for OpenEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenEvent::Connecting => write!(f, "Connecting"),
            OpenEvent::WaitingForCredential => write!(f, "WaitingForCredential"),
            OpenEvent::Progress(p) => write!(f, "Progress({:.2})", p),
            OpenEvent::Opened(store) => write!(f, "Opened({})", store.configuration().user_id),
            OpenEvent::Failed(e) => write!(f, "Failed({})", e),
        }
    }
}

/// Opens a store connected to sync.
pub trait SyncedStoreOpener: Send + Sync {
    /// Start opening; events arrive on the returned channel and end after
    /// `Opened` or `Failed`. Must be called from within a tokio runtime.
    fn open(&self, config: &StoreConfiguration) -> mpsc::Receiver<OpenEvent>;
}

/// Opens the on-device snapshot without sync.
#[async_trait]
pub trait LocalStoreOpener: Send + Sync {
    async fn open_local(&self, config: &StoreConfiguration) -> SyncResult<Arc<dyn StoreHandle>>;
}
