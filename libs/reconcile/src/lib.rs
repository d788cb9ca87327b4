//! Reconciliation loop primitives.
//!
//! This library provides the pieces a reconcile host needs to drive
//! per-object convergence. Key concepts:
//!
//! - **Action**: what a reconcile pass asks the host to do next.
//! - **Work queue**: keys waiting to be reconciled, deduplicated, with at most
//!   one in-flight pass per key.
//! - **Retry backoff**: per-key exponential delay after failed passes.
//!
//! # Invariants
//!
//! - A key is never handed to two workers at the same time
//! - Adding a key that is already queued is a no-op
//! - Adding a key while it is being processed defers it until `done`

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

/// Outcome of a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Converged; wait for the next event.
    Done,

    /// Run again after the delay, without treating this pass as a failure.
    Requeue(Duration),
}

impl Action {
    pub fn requeue(after: Duration) -> Self {
        Self::Requeue(after)
    }

    pub fn is_requeue(&self) -> bool {
        matches!(self, Self::Requeue(_))
    }
}

#[derive(Debug)]
struct QueueState<K> {
    queue: VecDeque<K>,
    /// Keys waiting to be processed (queued, or re-added while in flight).
    dirty: BTreeSet<K>,
    /// Keys handed out and not yet marked done.
    processing: BTreeSet<K>,
    shutting_down: bool,
}

/// Deduplicating work queue with per-key serialization.
#[derive(Debug)]
pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

impl<K> WorkQueue<K>
where
    K: Ord + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: BTreeSet::new(),
                processing: BTreeSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a key.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down || !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            // Picked up again by `done`.
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Enqueue a key once `delay` has elapsed.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key. Returns `None` once the queue is shut down and
    /// drained.
    pub async fn next(&self) -> Option<K> {
        loop {
            // Registered before the check so a concurrent add cannot be missed.
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark a key as finished. Re-queues it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            debug!(key = ?key, "Key re-added while in flight, requeueing");
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop accepting keys and wake every waiting worker.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        state.shutting_down = true;
        state.queue.clear();
        state.dirty.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self, key: &K) -> bool {
        self.lock().processing.contains(key)
    }
}

impl<K> Default for WorkQueue<K>
where
    K: Ord + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Per-key exponential backoff for failed reconcile passes.
///
/// Entries live from the first failure until `reset`. A host that requeues
/// every failed key and resets on success keeps only failing keys here.
#[derive(Debug, Clone)]
pub struct RetryBackoff<K> {
    base: Duration,
    cap: Duration,

    /// Consecutive failures per key.
    failures: BTreeMap<K, u32>,
}

impl<K: Ord + Clone> RetryBackoff<K> {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn record_failure(&mut self, key: &K) -> Duration {
        let count = self.failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;
        self.delay_for(count)
    }

    /// Consecutive failures recorded for a key.
    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Clear failure tracking for a key (on success).
    pub fn reset(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// Number of keys with at least one unreset failure.
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }

    /// The cap, used for errors that only a configuration change can fix.
    pub fn cap(&self) -> Duration {
        self.cap
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

impl<K: Ord + Clone> Default for RetryBackoff<K> {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP)
    }
}

/// Delay before re-running a key whose worker was just deleted for recreation.
pub const DEFAULT_RECREATE_REQUEUE: Duration = Duration::from_millis(500);

/// First retry delay after a failed pass.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(200);

/// Longest retry delay.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Default expiry sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
