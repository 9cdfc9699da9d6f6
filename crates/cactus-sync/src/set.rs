//! Per-collection subscription tracking.

use crate::{Filter, Subscription, SubscriptionBatch, SubscriptionRegistry, SyncError, SyncResult};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name -> filter mapping for one synced collection.
///
/// The base subscription is registered on [`attach`](Self::attach) and always
/// stays registered while attached. Additional subscriptions are tracked
/// locally and mirrored to the store's registry; the two are kept in step only
/// through the methods here.
pub struct SubscriptionSet {
    collection: String,
    base: Subscription,
    additional: Mutex<Vec<Subscription>>,
    registry: RwLock<Option<Arc<dyn SubscriptionRegistry>>>,
}

impl SubscriptionSet {
    /// Create a detached set. The base subscription is named `<collection>-base`.
    pub fn new(collection: impl Into<String>, base_filter: Filter) -> Self {
        let collection = collection.into();
        let base = Subscription::new(format!("{}-base", collection), collection.clone(), base_filter);
        Self {
            collection,
            base,
            additional: Mutex::new(Vec::new()),
            registry: RwLock::new(None),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn base(&self) -> &Subscription {
        &self.base
    }

    /// Tracked additional subscriptions, in insertion order.
    pub fn additional(&self) -> Vec<Subscription> {
        self.additional.lock().clone()
    }

    /// Number of tracked subscriptions, base included.
    pub fn len(&self) -> usize {
        self.additional.lock().len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, name: &str) -> bool {
        name == self.base.name || self.additional.lock().iter().any(|s| s.name == name)
    }

    pub fn is_attached(&self) -> bool {
        self.registry.read().is_some()
    }

    /// Bind to an opened store's registry.
    ///
    /// Remote entries for this collection that are neither the base nor
    /// tracked locally are dropped, and the base subscription is upserted, all
    /// in one transaction.
    pub async fn attach(&self, registry: Arc<dyn SubscriptionRegistry>) -> SyncResult<()> {
        let remote = registry.list().await?;
        let tracked = self.additional();

        let mut batch = SubscriptionBatch::new();
        for stale in remote.iter().filter(|s| {
            s.collection == self.collection
                && s.name != self.base.name
                && !tracked.iter().any(|t| t.name == s.name)
        }) {
            debug!(collection = %self.collection, name = %stale.name, "Dropping stale subscription");
            batch = batch.remove(stale.name.clone());
        }
        let mut batch = batch.upsert(self.base.clone());
        for sub in tracked {
            batch = batch.upsert(sub);
        }

        registry.apply_update(batch).await?;
        *self.registry.write() = Some(registry);

        info!(
            collection = %self.collection,
            base = %self.base.name,
            query = %self.base.query(),
            "Subscription set attached"
        );
        Ok(())
    }

    /// Unbind from the store. Local tracking is cleared.
    pub fn detach(&self) {
        *self.registry.write() = None;
        self.additional.lock().clear();
        debug!(collection = %self.collection, "Subscription set detached");
    }

    /// Add or replace a subscription, returning its name.
    ///
    /// A UUID name is generated when none is given. Re-using a name replaces
    /// that subscription's filter in place.
    pub async fn add_subscription(&self, name: Option<&str>, filter: Filter) -> SyncResult<String> {
        let registry = self.registry()?;
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if name == self.base.name {
            return Err(SyncError::BaseSubscription(name));
        }

        let sub = Subscription::new(name.clone(), self.collection.clone(), filter);
        registry
            .apply_update(SubscriptionBatch::new().upsert(sub.clone()))
            .await?;

        let mut tracked = self.additional.lock();
        match tracked.iter_mut().find(|s| s.name == name) {
            Some(existing) => existing.filter = sub.filter,
            None => tracked.push(sub),
        }
        drop(tracked);

        debug!(collection = %self.collection, name = %name, "Subscription added");
        Ok(name)
    }

    /// Add several filters in one transaction.
    ///
    /// With a name, each filter is registered as `<name>-<index>`; otherwise
    /// each gets a generated name.
    pub async fn add_subscriptions(
        &self,
        name: Option<&str>,
        filters: Vec<Filter>,
    ) -> SyncResult<Vec<String>> {
        let registry = self.registry()?;
        let subs: Vec<Subscription> = filters
            .into_iter()
            .enumerate()
            .map(|(i, filter)| {
                let sub_name = match name {
                    Some(n) => format!("{}-{}", n, i),
                    None => uuid::Uuid::new_v4().to_string(),
                };
                Subscription::new(sub_name, self.collection.clone(), filter)
            })
            .collect();
        if subs.iter().any(|s| s.name == self.base.name) {
            return Err(SyncError::BaseSubscription(self.base.name.clone()));
        }

        let batch = subs
            .iter()
            .cloned()
            .fold(SubscriptionBatch::new(), SubscriptionBatch::upsert);
        registry.apply_update(batch).await?;

        let mut tracked = self.additional.lock();
        for sub in &subs {
            match tracked.iter_mut().find(|s| s.name == sub.name) {
                Some(existing) => existing.filter = sub.filter.clone(),
                None => tracked.push(sub.clone()),
            }
        }

        Ok(subs.into_iter().map(|s| s.name).collect())
    }

    /// Remove a subscription by name. Absent names are a no-op.
    pub async fn remove_subscription(&self, name: &str) -> SyncResult<()> {
        if name == self.base.name {
            return Err(SyncError::BaseSubscription(name.to_string()));
        }
        let registry = self.registry()?;

        let tracked = self.additional.lock().iter().any(|s| s.name == name);
        let remote = tracked
            || registry
                .list()
                .await?
                .iter()
                .any(|s| s.name == name && s.collection == self.collection);
        if !remote {
            return Ok(());
        }

        registry
            .apply_update(SubscriptionBatch::new().remove(name))
            .await?;
        self.additional.lock().retain(|s| s.name != name);

        debug!(collection = %self.collection, name = %name, "Subscription removed");
        Ok(())
    }

    /// Remove every tracked subscription whose name contains `pattern`.
    ///
    /// The base subscription is never touched. Returns the removed names.
    pub async fn remove_subscriptions_by_prefix(&self, pattern: &str) -> SyncResult<Vec<String>> {
        let names: Vec<String> = self
            .additional
            .lock()
            .iter()
            .filter(|s| s.name.contains(pattern))
            .map(|s| s.name.clone())
            .collect();
        self.remove_tracked(names).await
    }

    /// Remove every tracked subscription except the base one.
    pub async fn remove_all_non_base(&self) -> SyncResult<Vec<String>> {
        let names: Vec<String> = self
            .additional
            .lock()
            .iter()
            .map(|s| s.name.clone())
            .collect();
        self.remove_tracked(names).await
    }

    async fn remove_tracked(&self, names: Vec<String>) -> SyncResult<Vec<String>> {
        let registry = self.registry()?;
        if names.is_empty() {
            return Ok(names);
        }

        let batch = names
            .iter()
            .cloned()
            .fold(SubscriptionBatch::new(), SubscriptionBatch::remove);
        if let Err(e) = registry.apply_update(batch).await {
            warn!(collection = %self.collection, count = names.len(), error = %e, "Subscription removal failed");
            return Err(e);
        }

        self.additional.lock().retain(|s| !names.contains(&s.name));
        debug!(collection = %self.collection, count = names.len(), "Subscriptions removed");
        Ok(names)
    }

    fn registry(&self) -> SyncResult<Arc<dyn SubscriptionRegistry>> {
        self.registry
            .read()
            .clone()
            .ok_or_else(|| SyncError::NotAttached(self.collection.clone()))
    }
}

impl std::fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("collection", &self.collection)
            .field("base", &self.base.name)
            .field("additional", &self.additional.lock().len())
            .field("attached", &self.is_attached())
            .finish()
    }
}
