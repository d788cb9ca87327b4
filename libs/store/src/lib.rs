//! Object store interface.
//!
//! The controller talks to the cluster's object store only through
//! [`ObjectStore`]. The trait is deliberately small:
//!
//! - `get` / `list` read objects by key or by namespace
//! - `create` fails with `AlreadyExists` when the key is taken
//! - `update` is conditional on the `resource_version` the caller read
//! - `delete` fails with `NotFound` when nothing is there
//!
//! Deleting an object cascades to every object that lists it as an owner.
//!
//! [`MemoryStore`] is a complete in-process implementation with watch events,
//! used by the controller binary in standalone mode and by tests.

mod error;
mod memory;
pub mod typed;

use async_trait::async_trait;
use ephem_objects::{Kind, ObjectKey, Resource};

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, WatchChange, WatchEvent};

/// Object store interface.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object.
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<Resource>;

    /// List objects of a kind, in one namespace or across all of them.
    ///
    /// Results are ordered by namespace, then name.
    async fn list(&self, kind: Kind, namespace: Option<&str>) -> StoreResult<Vec<Resource>>;

    /// Create an object. Returns the stored copy with store-assigned fields.
    async fn create(&self, object: Resource) -> StoreResult<Resource>;

    /// Replace an object. The object's `resource_version` must match the
    /// stored one.
    async fn update(&self, object: Resource) -> StoreResult<Resource>;

    /// Delete an object and everything it owns.
    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()>;
}
