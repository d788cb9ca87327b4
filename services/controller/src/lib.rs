//! ephem controller
//!
//! Runs short-lived application instances. Each Instance gets a worker pod
//! and a service; each namespace gets one ingress routing a path per
//! Instance; Instances past their TTL are deleted by a periodic sweep.
//!
//! ## Modules
//!
//! - [`workload`]: pod and service convergence for one Instance
//! - [`routing`]: route derivation and the per-namespace ingress
//! - [`expiry`]: the TTL sweep
//! - [`dispatch`]: the reconcile pass and its host
//! - [`ttl`]: TTL and identity policy
//! - [`seed`]: startup manifests
//! - [`config`]: environment configuration

pub mod config;
pub mod dispatch;
pub mod error;
pub mod expiry;
pub mod routing;
pub mod seed;
pub mod ttl;
pub mod workload;

pub use error::{ControllerError, ControllerResult};
