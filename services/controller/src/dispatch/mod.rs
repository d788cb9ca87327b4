//! Reconcile dispatch.
//!
//! [`InstanceReconciler`] runs one pass for one Instance key. [`Controller`]
//! hosts it: it turns store watch events into keys, filters Instance events
//! through an [`EventObserver`], and drives a worker pool over a
//! deduplicating work queue with retry backoff.

mod controller;
mod reconciler;

pub use controller::{Controller, ControllerConfig};
pub use reconciler::{AcceptAll, EventObserver, InstanceEvent, InstanceReconciler, TracingObserver};
