//! Route aggregation.
//!
//! Every namespace gets one ingress listing a route for each live Instance,
//! plus a catch-all default backend. The ingress is rebuilt from the full set
//! of Instances on every sync, so removed Instances drop out on their own.

mod ingress;
mod routes;

pub use ingress::*;
pub use routes::*;

use std::sync::Arc;

use ephem_objects::{Ingress, Instance, Object, Pod, Service};
use ephem_store::{typed, ObjectStore};
use tracing::{debug, info, instrument};

use crate::error::{ControllerError, ControllerResult};

/// Result of [`IngressManager::sync_namespace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Maintains the per-namespace ingress.
pub struct IngressManager {
    store: Arc<dyn ObjectStore>,
    settings: IngressSettings,
}

impl IngressManager {
    pub fn new(store: Arc<dyn ObjectStore>, settings: IngressSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &IngressSettings {
        &self.settings
    }

    /// Rebuild the namespace's ingress from its Instances.
    ///
    /// Writes only when something changed. Two syncs of the same namespace
    /// racing each other surface as a store conflict on the loser.
    #[instrument(skip(self))]
    pub async fn sync_namespace(&self, namespace: &str) -> ControllerResult<SyncOutcome> {
        let host = match self.settings.host.as_deref() {
            Some(host) if !host.is_empty() => host,
            _ => {
                return Err(ControllerError::Validation(
                    "ingress host is not configured".to_string(),
                ))
            }
        };

        self.ensure_default_backend(namespace).await?;

        let store = self.store.as_ref();
        let instances = typed::list::<Instance>(store, Some(namespace)).await?;
        let table = RouteTable::from_instances(&instances);
        let desired = desired_ingress(namespace, host, &table, &self.settings);
        let key = desired.key();

        let Some(mut current) = typed::get::<Ingress>(store, &key).await? else {
            typed::create(store, desired).await?;
            info!(routes = table.len(), "Created ingress");
            return Ok(SyncOutcome::Created);
        };

        let drift = ingress_drift(&current, &desired);
        if drift.is_empty() {
            debug!(routes = table.len(), "Ingress up to date");
            return Ok(SyncOutcome::Unchanged);
        }

        current.spec = desired.spec;
        typed::update(store, current).await?;
        info!(routes = table.len(), drift = ?drift, "Updated ingress");
        Ok(SyncOutcome::Updated)
    }

    /// Create the default backend pod and service if absent. Existing ones
    /// are left as they are.
    async fn ensure_default_backend(&self, namespace: &str) -> ControllerResult<()> {
        let store = self.store.as_ref();

        let pod = default_backend_pod(namespace);
        if typed::get::<Pod>(store, &pod.key()).await?.is_none() {
            typed::create(store, pod).await?;
            info!(pod = DEFAULT_BACKEND_NAME, "Created default backend pod");
        }

        let service = default_backend_service(namespace);
        if typed::get::<Service>(store, &service.key()).await?.is_none() {
            typed::create(store, service).await?;
            info!(service = DEFAULT_BACKEND_NAME, "Created default backend service");
        }

        Ok(())
    }
}
