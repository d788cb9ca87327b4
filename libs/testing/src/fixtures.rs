//! Instance fixtures.

use chrono::{DateTime, Duration, Utc};
use ephem_objects::{Instance, InstanceSpec, Object};
use ephem_store::{typed, ObjectStore};

pub const DEFAULT_IMAGE: &str = "nginx:1.25";
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Builder for test Instances.
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    instance: Instance,
}

/// Start an Instance with the default image and version.
pub fn instance(namespace: &str, name: &str) -> InstanceBuilder {
    InstanceBuilder {
        instance: Instance::new(
            namespace,
            name,
            InstanceSpec {
                version: DEFAULT_VERSION.to_string(),
                image: DEFAULT_IMAGE.to_string(),
                ..Default::default()
            },
        ),
    }
}

impl InstanceBuilder {
    pub fn image(mut self, image: &str) -> Self {
        self.instance.spec.image = image.to_string();
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.instance.spec.version = version.to_string();
        self
    }

    pub fn route_prefix(mut self, prefix: &str) -> Self {
        self.instance.spec.route_prefix = Some(prefix.to_string());
        self
    }

    pub fn ttl_seconds(mut self, ttl: i64) -> Self {
        self.instance.spec.ttl_seconds = Some(ttl);
        self
    }

    pub fn identity(mut self, identity: &str) -> Self {
        self.instance.spec.identity = Some(identity.to_string());
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.instance.metadata.creation_timestamp = Some(at);
        self
    }

    /// Backdate creation relative to now.
    pub fn created_ago(self, age: Duration) -> Self {
        self.created_at(Utc::now() - age)
    }

    pub fn build(self) -> Instance {
        self.instance
    }

    /// Create the Instance in `store` and return the stored copy.
    ///
    /// Panics on store errors; fixtures are for tests only.
    pub async fn create(self, store: &dyn ObjectStore) -> Instance {
        let key = self.instance.key();
        typed::create(store, self.instance)
            .await
            .unwrap_or_else(|e| panic!("failed to seed instance {key}: {e}"))
    }
}
