use std::sync::Arc;
use std::time::Duration;

use ephem_objects::{Instance, ObjectKey};
use ephem_reconcile::{Action, DEFAULT_RECREATE_REQUEUE};
use ephem_store::{typed, ObjectStore};
use tracing::{debug, info};

use crate::error::ControllerResult;
use crate::routing::IngressManager;
use crate::workload::{EnsureOutcome, WorkloadManager};

/// A change to an Instance seen on the watch stream.
#[derive(Debug, Clone, Copy)]
pub enum InstanceEvent<'a> {
    Created(&'a Instance),
    Updated(&'a Instance),
    Deleted(&'a Instance),
}

impl<'a> InstanceEvent<'a> {
    pub fn instance(&self) -> &'a Instance {
        match *self {
            Self::Created(i) | Self::Updated(i) | Self::Deleted(i) => i,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Deleted(_) => "deleted",
        }
    }
}

/// Decides whether an Instance event triggers a reconcile.
///
/// Observers may log or count events; they must not block.
pub trait EventObserver: Send + Sync {
    fn observe(&self, event: &InstanceEvent<'_>) -> bool;
}

/// Admits every event silently.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl EventObserver for AcceptAll {
    fn observe(&self, _event: &InstanceEvent<'_>) -> bool {
        true
    }
}

/// Admits every event and logs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn observe(&self, event: &InstanceEvent<'_>) -> bool {
        let instance = event.instance();
        info!(
            event = event.kind(),
            namespace = %instance.namespace(),
            instance = %instance.name(),
            version = %instance.spec.version,
            "Instance event"
        );
        true
    }
}

/// One reconcile pass for one Instance key.
pub struct InstanceReconciler {
    store: Arc<dyn ObjectStore>,
    workloads: Arc<WorkloadManager>,
    ingress: Arc<IngressManager>,
    recreate_requeue: Duration,
}

impl InstanceReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        workloads: Arc<WorkloadManager>,
        ingress: Arc<IngressManager>,
    ) -> Self {
        Self {
            store,
            workloads,
            ingress,
            recreate_requeue: DEFAULT_RECREATE_REQUEUE,
        }
    }

    /// Override the delay used after a pod was deleted for recreation.
    pub fn with_recreate_requeue(mut self, delay: Duration) -> Self {
        self.recreate_requeue = delay;
        self
    }

    /// Converge the Instance at `key`, then its namespace's ingress.
    ///
    /// A missing Instance only resyncs the ingress; its pod and service are
    /// removed by ownership. A pod deleted for recreation returns a short
    /// requeue and skips the ingress until the replacement exists.
    pub async fn reconcile(&self, key: &ObjectKey) -> ControllerResult<Action> {
        match typed::get::<Instance>(self.store.as_ref(), key).await? {
            Some(instance) => {
                let outcome = self.workloads.ensure(&instance).await?;
                if outcome == EnsureOutcome::PodRecreating {
                    debug!(%key, "Requeueing for pod recreation");
                    return Ok(Action::requeue(self.recreate_requeue));
                }
            }
            None => {
                debug!(%key, "Instance gone, resyncing ingress only");
            }
        }

        self.ingress.sync_namespace(&key.namespace).await?;
        Ok(Action::Done)
    }
}
