//! File-backed loopback store.
//!
//! Keeps one JSON snapshot per user holding the objects of every collection
//! and the subscription registry. The same snapshot serves the synced and the
//! offline open paths, so data written online is visible offline.

use crate::store::ID_FIELD;
use crate::{
    Filter, LocalStoreOpener, OpenEvent, StoreHandle, Subscription, SubscriptionBatch,
    SubscriptionRegistry, SyncError, SyncResult, SyncedStoreOpener,
};
use async_trait::async_trait;
use cactus_config::Paths;
use cactus_storage::StoreConfiguration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    collections: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    subscriptions: Vec<Subscription>,
}

struct Shared {
    path: PathBuf,
    snapshot: Mutex<Snapshot>,
    /// Held for the whole of a subscription update.
    txn: tokio::sync::Mutex<()>,
}

impl Shared {
    fn persist(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Run `f` against the snapshot and persist the result. On a persistence
    /// error the in-memory snapshot is rolled back.
    fn mutate<T>(&self, f: impl FnOnce(&mut Snapshot) -> SyncResult<T>) -> SyncResult<T> {
        let mut guard = self.snapshot.lock();
        let before = serde_json::to_value(&*guard)?;
        let out = f(&mut *guard)?;
        if let Err(e) = self.persist(&*guard) {
            *guard = serde_json::from_value(before)?;
            return Err(e);
        }
        Ok(out)
    }
}

/// Store backed by a JSON snapshot file.
pub struct FileStore {
    config: StoreConfiguration,
    synced: bool,
    shared: Arc<Shared>,
    registry: Arc<FileRegistry>,
}

impl FileStore {
    /// Open (or create) the snapshot at `path`.
    pub fn open(path: &Path, config: StoreConfiguration, synced: bool) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Snapshot::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };

        let shared = Arc::new(Shared {
            path: path.to_path_buf(),
            snapshot: Mutex::new(snapshot),
            txn: tokio::sync::Mutex::new(()),
        });
        debug!(path = %path.display(), synced, "File store opened");

        Ok(Self {
            config,
            synced,
            registry: Arc::new(FileRegistry {
                shared: shared.clone(),
            }),
            shared,
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }
}

#[async_trait]
impl StoreHandle for FileStore {
    fn configuration(&self) -> &StoreConfiguration {
        &self.config
    }

    fn subscriptions(&self) -> Arc<dyn SubscriptionRegistry> {
        self.registry.clone()
    }

    fn is_synced(&self) -> bool {
        self.synced
    }

    async fn insert(&self, collection: &str, mut object: Value) -> SyncResult<String> {
        let map = object
            .as_object_mut()
            .ok_or_else(|| SyncError::InvalidObject("expected a JSON object".to_string()))?;
        let id = match map.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                map.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        self.shared.mutate(|snapshot| {
            let objects = snapshot.collections.entry(collection.to_string()).or_default();
            match objects.iter_mut().find(|o| o[ID_FIELD] == id.as_str()) {
                Some(existing) => *existing = object,
                None => objects.push(object),
            }
            Ok(())
        })?;
        Ok(id)
    }

    async fn objects(&self, collection: &str, filter: &Filter) -> SyncResult<Vec<Value>> {
        let snapshot = self.shared.snapshot.lock();
        Ok(snapshot
            .collections
            .get(collection)
            .map(|objects| objects.iter().filter(|o| filter.matches(o)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> SyncResult<()> {
        let patch = match patch {
            Value::Object(map) => map,
            _ => return Err(SyncError::InvalidObject("patch must be a JSON object".to_string())),
        };

        self.shared.mutate(|snapshot| {
            let object = snapshot
                .collections
                .get_mut(collection)
                .and_then(|objects| objects.iter_mut().find(|o| o[ID_FIELD] == id))
                .and_then(Value::as_object_mut)
                .ok_or_else(|| SyncError::ObjectNotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            for (key, value) in patch {
                if key != ID_FIELD {
                    object.insert(key, value);
                }
            }
            Ok(())
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> SyncResult<bool> {
        self.shared.mutate(|snapshot| {
            Ok(match snapshot.collections.get_mut(collection) {
                Some(objects) => {
                    let before = objects.len();
                    objects.retain(|o| o[ID_FIELD] != id);
                    objects.len() != before
                }
                None => false,
            })
        })
    }
}

/// Subscription registry persisted in the store snapshot.
pub struct FileRegistry {
    shared: Arc<Shared>,
}

#[async_trait]
impl SubscriptionRegistry for FileRegistry {
    async fn list(&self) -> SyncResult<Vec<Subscription>> {
        Ok(self.shared.snapshot.lock().subscriptions.clone())
    }

    async fn apply_update(&self, batch: SubscriptionBatch) -> SyncResult<()> {
        let _txn = self.shared.txn.lock().await;
        self.shared.mutate(|snapshot| {
            batch.apply_to(&mut snapshot.subscriptions);
            Ok(())
        })?;
        debug!(ops = batch.len(), "Subscription transaction committed");
        Ok(())
    }
}

/// Opens [`FileStore`]s under the stores directory.
///
/// The synced path reports `Connecting`, `Progress(1.0)` and `Opened`, or
/// `Failed(Timeout)` when the snapshot cannot be loaded within the open
/// timeout.
#[derive(Debug, Clone)]
pub struct FileStoreOpener {
    paths: Paths,
    open_timeout: Duration,
}

impl FileStoreOpener {
    pub fn new(paths: Paths, open_timeout: Duration) -> Self {
        Self {
            paths,
            open_timeout,
        }
    }

    fn store_path(&self, config: &StoreConfiguration) -> SyncResult<PathBuf> {
        if config.user_id.trim().is_empty() {
            return Err(SyncError::Configuration("missing user id".to_string()));
        }
        Ok(self.paths.store_file(&config.user_id))
    }
}

impl SyncedStoreOpener for FileStoreOpener {
    fn open(&self, config: &StoreConfiguration) -> mpsc::Receiver<OpenEvent> {
        let (tx, rx) = mpsc::channel(8);
        let config = config.clone();
        let path = self.store_path(&config);
        let open_timeout = self.open_timeout;

        tokio::spawn(async move {
            let _ = tx.send(OpenEvent::Connecting).await;

            let path = match path {
                Ok(path) => path,
                Err(e) => {
                    let _ = tx.send(OpenEvent::Failed(e)).await;
                    return;
                }
            };

            let load = tokio::task::spawn_blocking(move || FileStore::open(&path, config, true));
            let event = match tokio::time::timeout(open_timeout, load).await {
                Ok(Ok(Ok(store))) => {
                    let _ = tx.send(OpenEvent::Progress(1.0)).await;
                    info!(path = %store.path().display(), "Synced store opened");
                    OpenEvent::Opened(Arc::new(store))
                }
                Ok(Ok(Err(e))) => OpenEvent::Failed(e),
                Ok(Err(join)) => OpenEvent::Failed(SyncError::Io(std::io::Error::other(join))),
                Err(_) => {
                    warn!(timeout_ms = open_timeout.as_millis() as u64, "Synced store open timed out");
                    OpenEvent::Failed(SyncError::Timeout(open_timeout.as_millis() as u64))
                }
            };
            let _ = tx.send(event).await;
        });

        rx
    }
}

#[async_trait]
impl LocalStoreOpener for FileStoreOpener {
    async fn open_local(&self, config: &StoreConfiguration) -> SyncResult<Arc<dyn StoreHandle>> {
        let path = self.store_path(config)?;
        let store = FileStore::open(&path, config.clone(), false)?;
        info!(path = %path.display(), "Local store opened");
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn config(user_id: &str) -> StoreConfiguration {
        StoreConfiguration {
            app_id: "cactus-test".to_string(),
            user_id: user_id.to_string(),
            base_url: "http://localhost".to_string(),
            flexible_sync: true,
        }
    }

    #[tokio::test]
    async fn test_insert_query_update_delete() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("u.json"), config("u"), true).unwrap();

        let id = store
            .insert("components", json!({ "name": "Ticket", "owner_id": "u" }))
            .await
            .unwrap();
        store
            .insert("components", json!({ "_id": "fixed", "name": "Blur", "owner_id": "v" }))
            .await
            .unwrap();

        let mine = store
            .objects("components", &Filter::eq("owner_id", "u"))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0]["_id"], id.as_str());

        store
            .update("components", "fixed", json!({ "name": "Loading Blur" }))
            .await
            .unwrap();
        let fixed = store.object("components", "fixed").await.unwrap().unwrap();
        assert_eq!(fixed["name"], "Loading Blur");

        assert!(store.delete("components", "fixed").await.unwrap());
        assert!(!store.delete("components", "fixed").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_object() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("u.json"), config("u"), false).unwrap();

        let result = store.update("components", "nope", json!({ "a": 1 })).await;
        assert!(matches!(result, Err(SyncError::ObjectNotFound { .. })));
    }

    #[tokio::test]
    async fn test_transfer_ownership() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("u.json"), config("u"), true).unwrap();
        let id = store
            .insert("components", json!({ "owner_id": "u" }))
            .await
            .unwrap();

        crate::transfer_ownership(&store, "components", &id, "v").await.unwrap();

        let object = store.object("components", &id).await.unwrap().unwrap();
        assert_eq!(object["owner_id"], "v");
    }

    #[tokio::test]
    async fn test_snapshot_persists_objects_and_subscriptions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("u.json");
        {
            let store = FileStore::open(&path, config("u"), true).unwrap();
            store.insert("profiles", json!({ "owner_id": "u" })).await.unwrap();
            store
                .subscriptions()
                .apply_update(SubscriptionBatch::new().upsert(Subscription::new(
                    "profiles-base",
                    "profiles",
                    Filter::All,
                )))
                .await
                .unwrap();
        }

        let reopened = FileStore::open(&path, config("u"), false).unwrap();
        assert_eq!(reopened.objects("profiles", &Filter::All).await.unwrap().len(), 1);
        assert_eq!(reopened.subscriptions().list().await.unwrap().len(), 1);
        assert!(!reopened.is_synced());
    }

    #[tokio::test]
    async fn test_opener_emits_connecting_progress_opened() {
        let dir = tempdir().unwrap();
        let opener = FileStoreOpener::new(
            Paths::with_base_dir(dir.path().to_path_buf()),
            Duration::from_secs(5),
        );

        let mut events = opener.open(&config("user-1"));
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(format!("{:?}", event));
        }

        assert_eq!(seen[0], "Connecting");
        assert_eq!(seen[1], "Progress(1.00)");
        assert_eq!(seen[2], "Opened(user-1)");
    }

    #[tokio::test]
    async fn test_opener_fails_without_user() {
        let dir = tempdir().unwrap();
        let opener = FileStoreOpener::new(
            Paths::with_base_dir(dir.path().to_path_buf()),
            Duration::from_secs(5),
        );

        let mut events = opener.open(&config(""));
        assert!(matches!(events.recv().await, Some(OpenEvent::Connecting)));
        assert!(matches!(
            events.recv().await,
            Some(OpenEvent::Failed(SyncError::Configuration(_)))
        ));
        assert!(opener.open_local(&config(" ")).await.is_err());
    }
}
