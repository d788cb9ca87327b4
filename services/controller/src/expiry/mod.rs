//! TTL expiry.
//!
//! A periodic sweep deletes Instances whose TTL has elapsed and resyncs the
//! ingress of every namespace that lost one.

mod worker;

pub use worker::{ExpiryWorker, ExpiryWorkerConfig, SweepStats};
