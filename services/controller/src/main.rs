//! ephem controller binary.
//!
//! Runs the reconcile host and the expiry sweep against an in-process store,
//! optionally seeded from a manifest file.

use std::sync::Arc;

use anyhow::Result;
use ephem_controller::{
    config,
    dispatch::{Controller, InstanceReconciler, TracingObserver},
    expiry::ExpiryWorker,
    routing::IngressManager,
    seed,
    workload::WorkloadManager,
};
use ephem_store::{MemoryStore, ObjectStore};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to EPHEM_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting ephem controller");
    info!(
        ingress_host = %config.ingress_host,
        default_ttl_secs = config.default_ttl_seconds,
        workers = config.workers,
        "Configuration loaded"
    );

    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn ObjectStore> = memory.clone();

    // Subscribe before seeding so no write is missed. Duplicate keys collapse in the queue.
    let events = memory.subscribe();

    if let Some(path) = &config.seed_file {
        let manifests = seed::load_file(path)?;
        if let Err(e) = seed::apply(store.as_ref(), manifests).await {
            error!(error = %e, "Failed to apply seed manifests");
            return Err(e);
        }
    }

    let workloads = Arc::new(WorkloadManager::new(store.clone(), config.workload_settings()));
    let ingress = Arc::new(IngressManager::new(store.clone(), config.ingress_settings()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler = Arc::new(InstanceReconciler::new(
        store.clone(),
        workloads.clone(),
        ingress.clone(),
    ));
    let controller = Arc::new(
        Controller::new(store.clone(), reconciler, config.controller_config())
            .with_observer(Arc::new(TracingObserver)),
    );
    let controller_handle = tokio::spawn(controller.run(events, shutdown_rx.clone()));

    let expiry_worker = ExpiryWorker::new(store, workloads, ingress, config.expiry_config());
    let expiry_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            expiry_worker.run(shutdown_rx).await;
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, controller_handle).await {
        warn!(error = %e, "Controller did not shut down in time");
    }

    if let Err(e) = tokio::time::timeout(shutdown_timeout, expiry_handle).await {
        warn!(error = %e, "Expiry worker did not shut down in time");
    }

    info!("Controller shutdown complete");
    Ok(())
}
