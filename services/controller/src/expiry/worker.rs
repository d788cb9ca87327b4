//! Expiry worker.
//!
//! Each sweep lists every Instance, tears down those past their deadline, and
//! then resyncs the ingress once per namespace that lost an Instance. A
//! failure on one Instance is logged and counted, never fatal to the sweep.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ephem_objects::Instance;
use ephem_reconcile::DEFAULT_SWEEP_INTERVAL;
use ephem_store::{typed, ObjectStore};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ControllerResult;
use crate::routing::IngressManager;
use crate::ttl;
use crate::workload::WorkloadManager;

#[derive(Debug, Clone)]
pub struct ExpiryWorkerConfig {
    pub interval: Duration,
}

impl Default for ExpiryWorkerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub expired: usize,
    pub deleted: usize,
    pub failed: usize,
    pub namespaces_synced: usize,
    pub namespaces_failed: usize,
}

pub struct ExpiryWorker {
    store: Arc<dyn ObjectStore>,
    workloads: Arc<WorkloadManager>,
    ingress: Arc<IngressManager>,
    config: ExpiryWorkerConfig,
}

impl ExpiryWorker {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        workloads: Arc<WorkloadManager>,
        ingress: Arc<IngressManager>,
        config: ExpiryWorkerConfig,
    ) -> Self {
        Self {
            store,
            workloads,
            ingress,
            config,
        }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            default_ttl_secs = self.workloads.settings().default_ttl_seconds,
            "Starting expiry worker"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tokio::select! {
                        result = self.sweep(Utc::now()) => {
                            if let Err(e) = result {
                                error!(error = %e, "Expiry sweep failed");
                            }
                        }
                        _ = shutdown.changed() => {
                            info!("Expiry worker shutting down mid-sweep");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Expiry worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Delete every Instance whose TTL has elapsed at `now`, then resync the
    /// ingress of each namespace that lost one.
    ///
    /// Only a failure to list Instances fails the sweep. A failed teardown or
    /// resync is logged, counted, and skipped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> ControllerResult<SweepStats> {
        let instances = typed::list::<Instance>(self.store.as_ref(), None).await?;
        let default_ttl = self.workloads.settings().default_ttl_seconds;

        let mut stats = SweepStats {
            scanned: instances.len(),
            ..Default::default()
        };
        let mut touched = BTreeSet::new();

        for instance in &instances {
            let Some(deadline) = ttl::expires_at(instance, default_ttl) else {
                continue;
            };
            if now < deadline {
                continue;
            }

            stats.expired += 1;
            match self.workloads.teardown(instance).await {
                Ok(report) => {
                    info!(
                        namespace = %instance.namespace(),
                        instance = %instance.name(),
                        expired_at = %deadline,
                        removed_pod = report.pod,
                        removed_service = report.service,
                        "Expired instance deleted"
                    );
                    stats.deleted += 1;
                    touched.insert(instance.namespace().to_string());
                }
                Err(e) => {
                    warn!(
                        namespace = %instance.namespace(),
                        instance = %instance.name(),
                        error = %e,
                        "Failed to delete expired instance"
                    );
                    stats.failed += 1;
                }
            }
        }

        for namespace in &touched {
            match self.ingress.sync_namespace(namespace).await {
                Ok(outcome) => {
                    debug!(namespace = %namespace, ?outcome, "Ingress resynced after expiry");
                    stats.namespaces_synced += 1;
                }
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        error = %e,
                        "Failed to resync ingress after expiry"
                    );
                    stats.namespaces_failed += 1;
                }
            }
        }

        if stats.expired > 0 {
            info!(
                scanned = stats.scanned,
                deleted = stats.deleted,
                failed = stats.failed,
                "Expiry sweep complete"
            );
        }
        Ok(stats)
    }
}
