//! In-memory object store.
//!
//! Keeps every object in one ordered map and publishes a [`WatchEvent`] for
//! each write. Version tokens come from a single monotonically increasing
//! counter, so a token never repeats across objects.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use ephem_objects::{Kind, ObjectKey, Resource};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::{ObjectStore, StoreError, StoreResult};

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchChange {
    Added,
    Modified,
    Deleted,
}

/// A change notification. Deleted events carry the last stored state.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub change: WatchChange,
    pub object: Resource,
}

const WATCH_CAPACITY: usize = 1024;

pub struct MemoryStore {
    objects: RwLock<BTreeMap<(Kind, ObjectKey), Resource>>,
    next_version: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            next_version: AtomicU64::new(1),
            events,
        }
    }

    /// Subscribe to changes made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    /// Number of stored objects of a kind.
    pub async fn count(&self, kind: Kind) -> usize {
        let objects = self.objects.read().await;
        objects.keys().filter(|(k, _)| *k == kind).count()
    }

    fn next_version(&self) -> String {
        self.next_version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn publish(&self, change: WatchChange, object: &Resource) {
        // No subscribers is fine.
        let _ = self.events.send(WatchEvent {
            change,
            object: object.clone(),
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<Resource> {
        let objects = self.objects.read().await;
        objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })
    }

    async fn list(&self, kind: Kind, namespace: Option<&str>) -> StoreResult<Vec<Resource>> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((k, key), _)| {
                *k == kind && namespace.is_none_or(|ns| key.namespace == ns)
            })
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn create(&self, mut object: Resource) -> StoreResult<Resource> {
        let kind = object.kind();
        let key = object.key();
        if key.name.is_empty() || key.namespace.is_empty() {
            return Err(StoreError::Invalid(format!(
                "{kind} requires both a namespace and a name"
            )));
        }

        let mut objects = self.objects.write().await;
        if objects.contains_key(&(kind, key.clone())) {
            return Err(StoreError::AlreadyExists { kind, key });
        }

        let meta = object.meta_mut();
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.resource_version = Some(self.next_version());
        meta.creation_timestamp.get_or_insert_with(Utc::now);

        debug!(kind = %kind, key = %key, "Object created");
        objects.insert((kind, key), object.clone());
        self.publish(WatchChange::Added, &object);
        Ok(object)
    }

    async fn update(&self, mut object: Resource) -> StoreResult<Resource> {
        let kind = object.kind();
        let key = object.key();

        let mut objects = self.objects.write().await;
        let Some(stored) = objects.get(&(kind, key.clone())) else {
            return Err(StoreError::NotFound { kind, key });
        };

        let stored_meta = stored.meta();
        let actual = stored_meta.resource_version.clone().unwrap_or_default();
        if object.meta().resource_version.as_deref() != Some(actual.as_str()) {
            return Err(StoreError::Conflict {
                kind,
                expected: object.meta().resource_version.clone(),
                actual,
                key,
            });
        }

        let uid = stored_meta.uid.clone();
        let created = stored_meta.creation_timestamp;
        let meta = object.meta_mut();
        meta.uid = uid;
        meta.creation_timestamp = created;
        meta.resource_version = Some(self.next_version());

        debug!(kind = %kind, key = %key, "Object updated");
        objects.insert((kind, key), object.clone());
        self.publish(WatchChange::Modified, &object);
        Ok(object)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()> {
        let mut objects = self.objects.write().await;
        let Some(removed) = objects.remove(&(kind, key.clone())) else {
            return Err(StoreError::NotFound {
                kind,
                key: key.clone(),
            });
        };
        debug!(kind = %kind, key = %key, "Object deleted");

        let mut orphaned_owners: Vec<String> = removed.meta().uid.iter().cloned().collect();
        self.publish(WatchChange::Deleted, &removed);

        // Cascade to owned objects, then to whatever they own.
        while let Some(owner_uid) = orphaned_owners.pop() {
            let owned: Vec<(Kind, ObjectKey)> = objects
                .iter()
                .filter(|(_, o)| o.meta().is_owned_by(&owner_uid))
                .map(|(slot, _)| slot.clone())
                .collect();

            for slot in owned {
                if let Some(dependent) = objects.remove(&slot) {
                    debug!(
                        kind = %slot.0,
                        key = %slot.1,
                        owner_uid = %owner_uid,
                        "Owned object deleted"
                    );
                    orphaned_owners.extend(dependent.meta().uid.iter().cloned());
                    self.publish(WatchChange::Deleted, &dependent);
                }
            }
        }

        Ok(())
    }
}
