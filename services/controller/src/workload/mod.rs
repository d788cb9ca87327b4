//! Instance convergence.
//!
//! Drives the worker pod and service for one Instance toward the desired
//! state. A pod that drifted is deleted and recreated on a later pass; a
//! service that drifted is updated in place.

mod desired;

pub use desired::*;

use std::sync::Arc;

use ephem_objects::{Instance, Kind, Object, ObjectKey, ObjectMeta, Pod, Service};
use ephem_store::{typed, ObjectStore};
use tracing::{debug, info, instrument};

use crate::error::{ControllerError, ControllerResult};

/// What happened to the service during a converged pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceChange {
    Unchanged,
    Created,
    Updated,
}

/// Result of [`WorkloadManager::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The worker pod was missing and has been created.
    PodCreated,

    /// The worker pod drifted and was deleted. The caller should run the
    /// pass again shortly so the replacement gets created.
    PodRecreating,

    /// The pod matches; the service was brought in line.
    Converged(ServiceChange),
}

/// Result of [`WorkloadManager::teardown`]: which objects were still present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub pod: bool,
    pub service: bool,
    pub instance: bool,
}

/// Mark `meta` as controlled by `instance`.
///
/// Without an owner uid the store cannot cascade deletes, so an Instance that
/// was never stored is refused.
fn set_owner(meta: &mut ObjectMeta, instance: &Instance) -> ControllerResult<()> {
    if meta.set_controller(Kind::Instance, &instance.metadata) {
        Ok(())
    } else {
        Err(ControllerError::Validation(format!(
            "instance {} has no uid, cannot own its objects",
            instance.key()
        )))
    }
}

/// Converges the objects backing each Instance.
pub struct WorkloadManager {
    store: Arc<dyn ObjectStore>,
    settings: WorkloadSettings,
}

impl WorkloadManager {
    pub fn new(store: Arc<dyn ObjectStore>, settings: WorkloadSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &WorkloadSettings {
        &self.settings
    }

    /// Bring the Instance's pod and service in line with its spec.
    ///
    /// Idempotent: a second call against a converged Instance performs no
    /// writes.
    #[instrument(
        skip(self, instance),
        fields(namespace = %instance.namespace(), instance = %instance.name())
    )]
    pub async fn ensure(&self, instance: &Instance) -> ControllerResult<EnsureOutcome> {
        let store = self.store.as_ref();
        let mut desired = desired_pod(instance, &self.settings);
        let pod_key = desired.key();

        let Some(current) = typed::get::<Pod>(store, &pod_key).await? else {
            set_owner(&mut desired.metadata, instance)?;
            typed::create(store, desired).await?;
            info!(pod = %pod_key.name, "Created worker pod");
            return Ok(EnsureOutcome::PodCreated);
        };

        let drift = pod_drift(&current, &desired);
        if !drift.is_empty() {
            let removed = typed::delete_ignore_missing::<Pod>(store, &pod_key).await?;
            info!(
                pod = %pod_key.name,
                drift = ?drift,
                removed,
                "Worker pod out of date, deleted for recreation"
            );
            return Ok(EnsureOutcome::PodRecreating);
        }

        let change = self.ensure_service(instance).await?;
        Ok(EnsureOutcome::Converged(change))
    }

    async fn ensure_service(&self, instance: &Instance) -> ControllerResult<ServiceChange> {
        let store = self.store.as_ref();
        let mut desired = desired_service(instance, &self.settings);
        let key = desired.key();

        let Some(mut current) = typed::get::<Service>(store, &key).await? else {
            set_owner(&mut desired.metadata, instance)?;
            typed::create(store, desired).await?;
            info!(service = %key.name, "Created service");
            return Ok(ServiceChange::Created);
        };

        let drift = service_drift(&current, &desired);
        if drift.is_empty() {
            debug!(service = %key.name, "Service up to date");
            return Ok(ServiceChange::Unchanged);
        }

        // Keep the fetched metadata so the update carries its version token.
        current.spec = desired.spec;
        typed::update(store, current).await?;
        info!(service = %key.name, drift = ?drift, "Updated service in place");
        Ok(ServiceChange::Updated)
    }

    /// Delete the Instance's pod, then its service, then the Instance itself.
    ///
    /// Objects already gone count as deleted. Does not depend on the store
    /// cascading deletes through owner references.
    #[instrument(
        skip(self, instance),
        fields(namespace = %instance.namespace(), instance = %instance.name())
    )]
    pub async fn teardown(&self, instance: &Instance) -> ControllerResult<TeardownReport> {
        let store = self.store.as_ref();
        let namespace = instance.namespace();

        let pod_key = ObjectKey::new(namespace, pod_name_for(instance.name()));
        let svc_key = ObjectKey::new(namespace, service_name_for(instance.name()));

        let report = TeardownReport {
            pod: typed::delete_ignore_missing::<Pod>(store, &pod_key).await?,
            service: typed::delete_ignore_missing::<Service>(store, &svc_key).await?,
            instance: typed::delete_ignore_missing::<Instance>(store, &instance.key()).await?,
        };
        debug!(?report, "Instance torn down");
        Ok(report)
    }
}
