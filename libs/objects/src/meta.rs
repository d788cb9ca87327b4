//! Object metadata shared by every kind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Kind;

/// Namespace + name: the identity of an object within its kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Marks an object as owned by another one.
///
/// The store deletes owned objects when the owner goes away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: Kind,
    pub name: String,
    pub uid: String,
    #[serde(default)]
    pub controller: bool,
}

/// Metadata carried by every object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    pub namespace: String,

    /// Assigned by the store on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Opaque version token, bumped by the store on every write.
    /// Updates must carry the token they read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Assigned by the store on create unless already set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// The owner reference flagged as controller, if any.
    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    /// Whether `uid` appears among this object's owners.
    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_references.iter().any(|r| r.uid == uid)
    }

    /// Attach `owner` as the controlling owner, replacing any previous one.
    ///
    /// Returns false when the owner has not been persisted yet (no uid), in
    /// which case nothing is attached.
    pub fn set_controller(&mut self, kind: Kind, owner: &ObjectMeta) -> bool {
        let Some(uid) = owner.uid.clone() else {
            return false;
        };
        self.owner_references.retain(|r| !r.controller);
        self.owner_references.push(OwnerReference {
            kind,
            name: owner.name.clone(),
            uid,
            controller: true,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_controller_requires_uid() {
        let owner = ObjectMeta::new("demo", "alpha");
        let mut owned = ObjectMeta::new("demo", "alpha-pod");
        assert!(!owned.set_controller(Kind::Instance, &owner));
        assert!(owned.owner_references.is_empty());
    }

    #[test]
    fn test_set_controller_replaces_previous() {
        let mut first = ObjectMeta::new("demo", "alpha");
        first.uid = Some("uid-1".to_string());
        let mut second = ObjectMeta::new("demo", "beta");
        second.uid = Some("uid-2".to_string());

        let mut owned = ObjectMeta::new("demo", "pod");
        assert!(owned.set_controller(Kind::Instance, &first));
        assert!(owned.set_controller(Kind::Instance, &second));

        assert_eq!(owned.owner_references.len(), 1);
        assert_eq!(owned.controller_owner().unwrap().name, "beta");
        assert!(owned.is_owned_by("uid-2"));
        assert!(!owned.is_owned_by("uid-1"));
    }

    #[test]
    fn test_key_display() {
        let key = ObjectKey::new("demo", "alpha");
        assert_eq!(key.to_string(), "demo/alpha");
    }
}
