//! Kinds and the tagged resource envelope persisted by the store.

use serde::{Deserialize, Serialize};

use crate::{Ingress, Instance, ObjectKey, ObjectMeta, Pod, Service};

/// Logical kind of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    Instance,
    Pod,
    Service,
    Ingress,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Instance, Kind::Pod, Kind::Service, Kind::Ingress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Instance => "Instance",
            Kind::Pod => "Pod",
            Kind::Service => "Service",
            Kind::Ingress => "Ingress",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any object the store knows how to hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Instance(Instance),
    Pod(Pod),
    Service(Service),
    Ingress(Ingress),
}

impl Resource {
    pub fn kind(&self) -> Kind {
        match self {
            Resource::Instance(_) => Kind::Instance,
            Resource::Pod(_) => Kind::Pod,
            Resource::Service(_) => Kind::Service,
            Resource::Ingress(_) => Kind::Ingress,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Resource::Instance(o) => &o.metadata,
            Resource::Pod(o) => &o.metadata,
            Resource::Service(o) => &o.metadata,
            Resource::Ingress(o) => &o.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Resource::Instance(o) => &mut o.metadata,
            Resource::Pod(o) => &mut o.metadata,
            Resource::Service(o) => &mut o.metadata,
            Resource::Ingress(o) => &mut o.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

/// A concrete kind that can be moved in and out of a [`Resource`].
pub trait Object: Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn into_resource(self) -> Resource;

    /// Unwrap the resource, handing it back unchanged on a kind mismatch.
    fn try_from_resource(resource: Resource) -> Result<Self, Resource>;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

macro_rules! impl_object {
    ($ty:ident) => {
        impl Object for $ty {
            const KIND: Kind = Kind::$ty;

            fn meta(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }

            fn into_resource(self) -> Resource {
                Resource::$ty(self)
            }

            fn try_from_resource(resource: Resource) -> Result<Self, Resource> {
                match resource {
                    Resource::$ty(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }

        impl From<$ty> for Resource {
            fn from(value: $ty) -> Self {
                Resource::$ty(value)
            }
        }
    };
}

impl_object!(Instance);
impl_object!(Pod);
impl_object!(Service);
impl_object!(Ingress);
