//! Reconcile host.
//!
//! Turns store watch events into Instance keys and runs a pool of workers
//! over the work queue. Failed passes are requeued with per-key backoff.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ephem_objects::{Instance, Kind, ObjectKey, Resource};
use ephem_reconcile::{Action, RetryBackoff, WorkQueue, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP};
use ephem_store::{typed, ObjectStore, StoreResult, WatchChange, WatchEvent};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::reconciler::{AcceptAll, EventObserver, InstanceEvent, InstanceReconciler};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of keys reconciled in parallel.
    pub workers: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

/// Feeds Instance keys from the watch stream to a pool of reconcile workers.
pub struct Controller {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<InstanceReconciler>,
    observer: Arc<dyn EventObserver>,
    queue: Arc<WorkQueue<ObjectKey>>,
    backoff: Mutex<RetryBackoff<ObjectKey>>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        reconciler: Arc<InstanceReconciler>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            reconciler,
            observer: Arc::new(AcceptAll),
            queue: Arc::new(WorkQueue::new()),
            backoff: Mutex::new(RetryBackoff::new(config.backoff_base, config.backoff_cap)),
            config,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn queue(&self) -> &Arc<WorkQueue<ObjectKey>> {
        &self.queue
    }

    /// Keys whose last pass failed and has not yet succeeded.
    pub fn retrying(&self) -> usize {
        self.backoff().tracked()
    }

    fn backoff(&self) -> MutexGuard<'_, RetryBackoff<ObjectKey>> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Map a watch event to the Instance key it concerns.
    ///
    /// Instance events go through the observer. Pod and Service events map
    /// to their controlling Instance. Everything else is ignored.
    pub fn key_for_event(&self, event: &WatchEvent) -> Option<ObjectKey> {
        match &event.object {
            Resource::Instance(instance) => {
                let observed = match event.change {
                    WatchChange::Added => InstanceEvent::Created(instance),
                    WatchChange::Modified => InstanceEvent::Updated(instance),
                    WatchChange::Deleted => InstanceEvent::Deleted(instance),
                };
                self.observer
                    .observe(&observed)
                    .then(|| instance.metadata.key())
            }
            Resource::Pod(_) | Resource::Service(_) => {
                let meta = event.object.meta();
                meta.controller_owner()
                    .filter(|owner| owner.kind == Kind::Instance)
                    .map(|owner| ObjectKey::new(meta.namespace.clone(), owner.name.clone()))
            }
            Resource::Ingress(_) => None,
        }
    }

    /// Queue every stored Instance.
    pub async fn enqueue_all(&self) -> StoreResult<usize> {
        let instances = typed::list::<Instance>(self.store.as_ref(), None).await?;
        for instance in &instances {
            self.queue.add(instance.metadata.key());
        }
        Ok(instances.len())
    }

    /// Run until `shutdown` flips or the watch stream closes.
    ///
    /// `events` should be subscribed before the call so nothing written
    /// between the initial list and the first receive is missed.
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(workers = self.config.workers, "Starting controller");

        match self.enqueue_all().await {
            Ok(count) => info!(instances = count, "Queued existing instances"),
            Err(e) => error!(error = %e, "Failed to list instances at startup"),
        }

        let workers: Vec<_> = (0..self.config.workers.max(1))
            .map(|id| {
                let this = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { this.worker_loop(id, shutdown).await })
            })
            .collect();

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        if let Some(key) = self.key_for_event(&event) {
                            self.queue.add(key);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Watch stream lagged, requeueing all instances");
                        if let Err(e) = self.enqueue_all().await {
                            error!(error = %e, "Failed to relist instances");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Watch stream closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Controller shutting down");
                        break;
                    }
                }
            }
        }

        self.queue.shut_down();
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Reconcile worker panicked");
            }
        }
        info!("Controller stopped");
    }

    async fn worker_loop(&self, id: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker = id, "Reconcile worker started");
        while let Some(key) = self.queue.next().await {
            tokio::select! {
                _ = self.process(&key) => {}
                _ = shutdown.changed() => {
                    self.queue.done(&key);
                    break;
                }
            }
        }
        debug!(worker = id, "Reconcile worker stopped");
    }

    async fn process(&self, key: &ObjectKey) {
        match self.reconciler.reconcile(key).await {
            Ok(Action::Done) => {
                self.backoff().reset(key);
            }
            Ok(Action::Requeue(delay)) => {
                self.backoff().reset(key);
                self.queue.add_after(key.clone(), delay);
            }
            Err(e) if e.is_retryable() => {
                let delay = self.backoff().record_failure(key);
                warn!(%key, error = %e, retry_in_ms = delay.as_millis() as u64, "Reconcile failed");
                self.queue.add_after(key.clone(), delay);
            }
            Err(e) => {
                let delay = self.backoff().cap();
                error!(
                    %key,
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "Reconcile failed, not retryable"
                );
                self.queue.add_after(key.clone(), delay);
            }
        }
        self.queue.done(key);
    }
}
