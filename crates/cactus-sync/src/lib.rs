//! Synchronized-store plumbing for Cactus.
//!
//! - [`Filter`]: predicate over JSON objects, rendered as a query string
//! - [`SubscriptionSet`]: per-collection name -> filter tracking mirrored to a
//!   store's [`SubscriptionRegistry`]
//! - [`StoreHandle`], [`OpenEvent`] and the opener traits: how a store is
//!   opened online or offline
//! - [`FileStore`]: on-device snapshot store and its opener
//! - [`NetworkMonitor`]: availability polling

mod error;
mod file_store;
mod filter;
mod network;
mod set;
mod store;
mod subscription;

pub use error::{SyncError, SyncResult};
pub use file_store::{FileRegistry, FileStore, FileStoreOpener};
pub use filter::Filter;
pub use network::{AvailabilitySink, NetworkMonitor, PathProbe, TcpProbe};
pub use set::SubscriptionSet;
pub use store::{
    transfer_ownership, LocalStoreOpener, OpenEvent, StoreHandle, SyncedStoreOpener, ID_FIELD,
    OWNER_FIELD,
};
pub use subscription::{MemoryRegistry, Subscription, SubscriptionBatch, SubscriptionOp, SubscriptionRegistry};
