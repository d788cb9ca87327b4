//! Test support for the ephem controller.
//!
//! - [`RecordingStore`] wraps a [`MemoryStore`], logs every call and can be
//!   told to fail specific operations.
//! - [`fixtures`] builds Instances with sensible defaults.

pub mod fixtures;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ephem_objects::{Kind, ObjectKey, Resource};
use ephem_store::{MemoryStore, ObjectStore, StoreError, StoreResult};

/// Store operation, for call logs and fault rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl StoreOp {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub kind: Kind,
    /// Object key for keyed calls; `None` for lists.
    pub key: Option<ObjectKey>,
}

#[derive(Debug, Clone)]
struct Fault {
    op: StoreOp,
    kind: Kind,
    name: Option<String>,
    error: StoreError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

impl Fault {
    fn matches(&self, op: StoreOp, kind: Kind, key: Option<&ObjectKey>) -> bool {
        self.op == op
            && self.kind == kind
            && match (&self.name, key) {
                (None, _) => true,
                (Some(name), Some(key)) => &key.name == name,
                (Some(_), None) => false,
            }
    }
}

/// A [`MemoryStore`] wrapper that records calls and injects failures.
///
/// Failed calls are recorded too, and never reach the inner store.
pub struct RecordingStore {
    inner: Arc<MemoryStore>,
    calls: Mutex<Vec<StoreCall>>,
    faults: Mutex<Vec<Fault>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::wrap(Arc::new(MemoryStore::new()))
    }

    pub fn wrap(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped store, for setup and assertions that should not be logged.
    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// Recorded create/update/delete calls.
    pub fn writes(&self) -> Vec<StoreCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.op.is_write())
            .cloned()
            .collect()
    }

    pub fn count(&self, op: StoreOp, kind: Kind) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.op == op && c.kind == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Fail every matching call. `name: None` matches any object of the kind.
    pub fn fail(&self, op: StoreOp, kind: Kind, name: Option<&str>, error: StoreError) {
        self.push_fault(op, kind, name, error, None);
    }

    /// Fail the next matching call only.
    pub fn fail_once(&self, op: StoreOp, kind: Kind, name: Option<&str>, error: StoreError) {
        self.push_fault(op, kind, name, error, Some(1));
    }

    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
    }

    fn push_fault(
        &self,
        op: StoreOp,
        kind: Kind,
        name: Option<&str>,
        error: StoreError,
        remaining: Option<usize>,
    ) {
        lock(&self.faults).push(Fault {
            op,
            kind,
            name: name.map(str::to_string),
            error,
            remaining,
        });
    }

    fn record(&self, op: StoreOp, kind: Kind, key: Option<&ObjectKey>) -> StoreResult<()> {
        lock(&self.calls).push(StoreCall {
            op,
            kind,
            key: key.cloned(),
        });

        let mut faults = lock(&self.faults);
        let Some(idx) = faults.iter().position(|f| f.matches(op, kind, key)) else {
            return Ok(());
        };
        let error = faults[idx].error.clone();
        let exhausted = match faults[idx].remaining.as_mut() {
            Some(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            faults.remove(idx);
        }
        Err(error)
    }
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<Resource> {
        self.record(StoreOp::Get, kind, Some(key))?;
        self.inner.get(kind, key).await
    }

    async fn list(&self, kind: Kind, namespace: Option<&str>) -> StoreResult<Vec<Resource>> {
        self.record(StoreOp::List, kind, None)?;
        self.inner.list(kind, namespace).await
    }

    async fn create(&self, object: Resource) -> StoreResult<Resource> {
        self.record(StoreOp::Create, object.kind(), Some(&object.key()))?;
        self.inner.create(object).await
    }

    async fn update(&self, object: Resource) -> StoreResult<Resource> {
        self.record(StoreOp::Update, object.kind(), Some(&object.key()))?;
        self.inner.update(object).await
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()> {
        self.record(StoreOp::Delete, kind, Some(key))?;
        self.inner.delete(kind, key).await
    }
}
