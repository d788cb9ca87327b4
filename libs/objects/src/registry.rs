//! Kind registry.
//!
//! Maps logical kind names to a decoder and a validator. The registry is built
//! once, on first use, and is read-only afterwards.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::{Instance, Kind, Object, ObjectError, ObjectMeta, Resource};

type Decoder = fn(serde_json::Value) -> Result<Resource, ObjectError>;
type Validator = fn(&Resource) -> Result<(), ObjectError>;

/// Registration for one kind.
#[derive(Clone, Copy)]
pub struct KindEntry {
    pub kind: Kind,
    decode: Decoder,
    validate: Validator,
}

impl KindEntry {
    pub fn decode(&self, value: serde_json::Value) -> Result<Resource, ObjectError> {
        (self.decode)(value)
    }

    pub fn validate(&self, resource: &Resource) -> Result<(), ObjectError> {
        (self.validate)(resource)
    }
}

impl std::fmt::Debug for KindEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindEntry").field("kind", &self.kind).finish()
    }
}

/// Kind name -> registration.
#[derive(Debug)]
pub struct KindRegistry {
    entries: BTreeMap<&'static str, KindEntry>,
}

static REGISTRY: LazyLock<KindRegistry> = LazyLock::new(KindRegistry::builtin);

/// The process-wide registry.
pub fn registry() -> &'static KindRegistry {
    &REGISTRY
}

impl KindRegistry {
    fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        for kind in Kind::ALL {
            let validate: Validator = match kind {
                Kind::Instance => validate_instance,
                _ => validate_metadata_only,
            };
            entries.insert(
                kind.as_str(),
                KindEntry {
                    kind,
                    decode: decode_tagged,
                    validate,
                },
            );
        }
        Self { entries }
    }

    pub fn lookup(&self, name: &str) -> Option<&KindEntry> {
        self.entries.get(name)
    }

    pub fn kinds(&self) -> impl Iterator<Item = Kind> + '_ {
        self.entries.values().map(|e| e.kind)
    }

    /// Decode a manifest by its `kind` field and validate the result.
    pub fn decode(&self, value: serde_json::Value) -> Result<Resource, ObjectError> {
        let name = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or(ObjectError::MissingKind)?
            .to_string();
        let entry = self
            .lookup(&name)
            .ok_or_else(|| ObjectError::UnknownKind(name.clone()))?;

        let resource = entry.decode(value)?;
        entry.validate(&resource)?;
        Ok(resource)
    }
}

fn decode_tagged(value: serde_json::Value) -> Result<Resource, ObjectError> {
    Ok(serde_json::from_value(value)?)
}

fn validate_metadata_only(resource: &Resource) -> Result<(), ObjectError> {
    validate_meta(resource.kind(), resource.meta())
}

fn validate_instance(resource: &Resource) -> Result<(), ObjectError> {
    validate_metadata_only(resource)?;
    let Resource::Instance(instance) = resource else {
        return Err(invalid(resource.kind(), resource.meta(), "expected an Instance"));
    };

    if instance.spec.image.trim().is_empty() {
        return Err(invalid(Instance::KIND, &instance.metadata, "spec.image is required"));
    }
    if instance.spec.version.trim().is_empty() {
        return Err(invalid(Instance::KIND, &instance.metadata, "spec.version is required"));
    }
    Ok(())
}

fn validate_meta(kind: Kind, meta: &ObjectMeta) -> Result<(), ObjectError> {
    if !is_dns_label(&meta.name) {
        return Err(invalid(kind, meta, "metadata.name must be a DNS label"));
    }
    if !is_dns_label(&meta.namespace) {
        return Err(invalid(kind, meta, "metadata.namespace must be a DNS label"));
    }
    Ok(())
}

fn invalid(kind: Kind, meta: &ObjectMeta, reason: &str) -> ObjectError {
    ObjectError::Invalid {
        kind: kind.to_string(),
        name: meta.name.clone(),
        reason: reason.to_string(),
    }
}

/// Lowercase alphanumerics and `-`, at most 63 characters, alphanumeric ends.
pub fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    edge_ok(bytes[0])
        && edge_ok(bytes[bytes.len() - 1])
        && bytes
            .iter()
            .all(|&b| edge_ok(b) || b == b'-')
}
