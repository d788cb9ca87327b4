//! Typed helpers over [`ObjectStore`].
//!
//! These convert between concrete kinds and [`Resource`] so callers never
//! match on the envelope themselves.

use ephem_objects::{Object, ObjectKey, Resource};

use crate::{ObjectStore, StoreError, StoreResult};

fn downcast<T: Object>(resource: Resource) -> StoreResult<T> {
    T::try_from_resource(resource).map_err(|other| StoreError::KindMismatch {
        expected: T::KIND,
        actual: other.kind(),
    })
}

/// Fetch an object, mapping not-found to `None`.
pub async fn get<T: Object>(store: &dyn ObjectStore, key: &ObjectKey) -> StoreResult<Option<T>> {
    match store.get(T::KIND, key).await {
        Ok(resource) => downcast(resource).map(Some),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// List objects of `T`'s kind.
pub async fn list<T: Object>(
    store: &dyn ObjectStore,
    namespace: Option<&str>,
) -> StoreResult<Vec<T>> {
    store
        .list(T::KIND, namespace)
        .await?
        .into_iter()
        .map(downcast::<T>)
        .collect()
}

pub async fn create<T: Object>(store: &dyn ObjectStore, object: T) -> StoreResult<T> {
    downcast(store.create(object.into_resource()).await?)
}

pub async fn update<T: Object>(store: &dyn ObjectStore, object: T) -> StoreResult<T> {
    downcast(store.update(object.into_resource()).await?)
}

/// Delete an object; a missing object counts as deleted.
///
/// Returns whether something was actually removed.
pub async fn delete_ignore_missing<T: Object>(
    store: &dyn ObjectStore,
    key: &ObjectKey,
) -> StoreResult<bool> {
    match store.delete(T::KIND, key).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
