//! Startup manifests.
//!
//! The seed file is a JSON array of objects, each tagged with its `kind`.
//! Every entry is decoded and validated through the kind registry before
//! anything is written.

use std::path::Path;

use anyhow::{Context, Result};
use ephem_objects::{registry::registry, Resource};
use ephem_store::{ObjectStore, StoreError};
use tracing::{info, warn};

/// Decode a JSON array of manifests.
pub fn parse_manifests(json: &str) -> Result<Vec<Resource>> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(json).context("Seed manifests must be a JSON array.")?;

    values
        .into_iter()
        .enumerate()
        .map(|(idx, value)| {
            registry()
                .decode(value)
                .with_context(|| format!("Invalid manifest at index {idx}"))
        })
        .collect()
}

pub fn load_file(path: &Path) -> Result<Vec<Resource>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    parse_manifests(&json).with_context(|| format!("Failed to parse seed file {}", path.display()))
}

/// Create each manifest in order. Objects that already exist are skipped.
///
/// Returns the number of objects created.
pub async fn apply(store: &dyn ObjectStore, manifests: Vec<Resource>) -> Result<usize> {
    let mut created = 0;
    for manifest in manifests {
        let (kind, key) = (manifest.kind(), manifest.key());
        match store.create(manifest).await {
            Ok(_) => created += 1,
            Err(StoreError::AlreadyExists { .. }) => {
                warn!(%kind, %key, "Seed object already exists, skipping");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create seed object {kind} {key}"));
            }
        }
    }
    info!(created, "Seed manifests applied");
    Ok(created)
}
