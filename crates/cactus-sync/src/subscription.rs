//! Subscriptions and the registry they live in.

use crate::{Filter, SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A named filter over one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub name: String,
    pub collection: String,
    pub filter: Filter,
}

impl Subscription {
    pub fn new(name: impl Into<String>, collection: impl Into<String>, filter: Filter) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            filter,
        }
    }

    /// Query string registered with the store.
    pub fn query(&self) -> String {
        self.filter.to_string()
    }
}

/// One mutation inside a subscription update.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionOp {
    /// Replace the filter of a same-named subscription, or append.
    Upsert(Subscription),
    /// Remove by name. Absent names are ignored.
    Remove(String),
}

/// Mutations applied together as one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionBatch {
    ops: Vec<SubscriptionOp>,
}

impl SubscriptionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(mut self, subscription: Subscription) -> Self {
        self.ops.push(SubscriptionOp::Upsert(subscription));
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.ops.push(SubscriptionOp::Remove(name.into()));
        self
    }

    pub fn ops(&self) -> &[SubscriptionOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Apply the batch to a list of subscriptions in order.
    pub fn apply_to(&self, subscriptions: &mut Vec<Subscription>) {
        for op in &self.ops {
            match op {
                SubscriptionOp::Upsert(sub) => {
                    match subscriptions.iter_mut().find(|s| s.name == sub.name) {
                        Some(existing) => *existing = sub.clone(),
                        None => subscriptions.push(sub.clone()),
                    }
                }
                SubscriptionOp::Remove(name) => subscriptions.retain(|s| &s.name != name),
            }
        }
    }
}

/// Subscription registry of an opened store.
///
/// Implementations must run at most one `apply_update` at a time per store;
/// callers rely on that to treat an update as a critical section.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Every subscription currently registered, across collections.
    async fn list(&self) -> SyncResult<Vec<Subscription>>;

    /// Apply a batch atomically. On error nothing is applied.
    async fn apply_update(&self, batch: SubscriptionBatch) -> SyncResult<()>;
}

/// Registry kept in process memory.
///
/// Used for offline stores and in tests; failures can be injected.
#[derive(Default)]
pub struct MemoryRegistry {
    subscriptions: Mutex<Vec<Subscription>>,
    fail_updates: Mutex<Option<String>>,
    updates: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent update fail with `reason` (or succeed again with `None`).
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.fail_updates.lock() = reason.map(str::to_string);
    }

    /// Number of successfully applied transactions.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<Subscription> {
        self.subscriptions.lock().clone()
    }
}

#[async_trait]
impl SubscriptionRegistry for MemoryRegistry {
    async fn list(&self) -> SyncResult<Vec<Subscription>> {
        Ok(self.snapshot())
    }

    async fn apply_update(&self, batch: SubscriptionBatch) -> SyncResult<()> {
        if let Some(reason) = self.fail_updates.lock().clone() {
            return Err(SyncError::Transaction(reason));
        }
        batch.apply_to(&mut self.subscriptions.lock());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_upsert_replaces_in_place() {
        let mut subs = vec![
            Subscription::new("a", "c", Filter::All),
            Subscription::new("b", "c", Filter::All),
        ];

        SubscriptionBatch::new()
            .upsert(Subscription::new("a", "c", Filter::eq("x", 1)))
            .upsert(Subscription::new("d", "c", Filter::All))
            .remove("b")
            .remove("missing")
            .apply_to(&mut subs);

        let names: Vec<_> = subs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "d"]);
        assert_eq!(subs[0].filter, Filter::eq("x", 1));
    }

    #[tokio::test]
    async fn test_memory_registry_failure_applies_nothing() {
        let registry = MemoryRegistry::new();
        registry.set_failure(Some("conflict"));

        let result = registry
            .apply_update(SubscriptionBatch::new().upsert(Subscription::new("a", "c", Filter::All)))
            .await;

        assert!(matches!(result, Err(SyncError::Transaction(_))));
        assert!(registry.list().await.unwrap().is_empty());
        assert_eq!(registry.update_count(), 0);
    }
}
