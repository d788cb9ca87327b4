//! # ephem-objects
//!
//! Object model for the ephem instance controller.
//!
//! ## Kinds
//!
//! - `Instance`: user-declared request for an ephemeral application
//! - `Pod`: the worker process backing one Instance (or the default backend)
//! - `Service`: the stable network endpoint in front of a Pod
//! - `Ingress`: the namespace-wide entry point aggregating all routes
//!
//! Every object carries an [`ObjectMeta`] with its key (namespace + name),
//! store-assigned identity (`uid`, `resource_version`, `creation_timestamp`),
//! labels and owner references. Objects travel through the store as a tagged
//! [`Resource`] enum; the [`registry`] maps kind names to decoders and
//! validators for manifests read from outside the process.

mod error;
mod meta;
pub mod registry;
mod resource;
mod types;

pub use error::ObjectError;
pub use meta::*;
pub use resource::*;
pub use types::*;
