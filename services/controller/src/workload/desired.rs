//! Desired worker pod and service for an Instance, plus drift detection.

use std::collections::BTreeMap;

use ephem_objects::{
    Container, ContainerPort, EnvVar, Instance, ObjectMeta, Pod, PodSpec, PullPolicy,
    RestartPolicy, Service, ServicePort, ServiceSpec, ServiceType, Volume, VolumeMount,
};

use crate::ttl;

pub const APP_LABEL: &str = "app";
pub const APP_LABEL_VALUE: &str = "ephem";
pub const NAME_LABEL: &str = "ephem-name";
pub const VERSION_LABEL: &str = "ephem-version";

/// Environment variable carrying the instance version into the container.
pub const VERSION_ENV: &str = "EPHEM_VERSION";

pub const CONTAINER_NAME: &str = "app";
pub const PORT_NAME: &str = "http";

/// Port every service exposes, whatever the pod listens on.
pub const SERVICE_PORT: u16 = 80;

pub const CONFIG_VOLUME: &str = "ephem-config";
pub const CONFIG_SECRET: &str = "ephem-config";
pub const CONFIG_MOUNT_PATH: &str = "/etc/ephem";

/// Process-wide inputs to the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSettings {
    /// TTL applied when an Instance has no positive override. 0 disables expiry.
    pub default_ttl_seconds: i64,

    /// Execution identity applied when an Instance names none.
    pub default_identity: String,

    /// Port the application container listens on.
    pub pod_port: u16,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 3600,
            default_identity: ttl::FALLBACK_IDENTITY.to_string(),
            pod_port: 8080,
        }
    }
}

pub fn pod_name_for(instance: &str) -> String {
    format!("{instance}-pod")
}

pub fn service_name_for(instance: &str) -> String {
    format!("{instance}-svc")
}

fn selector_for(instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(NAME_LABEL.to_string(), instance.to_string())])
}

/// The worker pod an Instance should have. Ownership is attached by the
/// caller once the Instance's uid is known.
pub fn desired_pod(instance: &Instance, settings: &WorkloadSettings) -> Pod {
    let name = instance.name();
    let version = instance.spec.version.as_str();

    let metadata = ObjectMeta::new(instance.namespace(), pod_name_for(name)).with_labels([
        (APP_LABEL, APP_LABEL_VALUE),
        (NAME_LABEL, name),
        (VERSION_LABEL, version),
    ]);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: instance.spec.image.clone(),
        image_pull_policy: PullPolicy::IfNotPresent,
        env: vec![EnvVar::new(VERSION_ENV, version)],
        ports: vec![ContainerPort {
            name: Some(PORT_NAME.to_string()),
            container_port: settings.pod_port,
        }],
        volume_mounts: vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
        }],
    };

    Pod {
        metadata,
        spec: PodSpec {
            active_deadline_seconds: ttl::deadline_seconds(instance, settings.default_ttl_seconds),
            service_account_name: Some(
                ttl::resolve_identity(instance, &settings.default_identity).to_string(),
            ),
            containers: vec![container],
            volumes: vec![Volume {
                name: CONFIG_VOLUME.to_string(),
                secret_name: CONFIG_SECRET.to_string(),
            }],
            restart_policy: RestartPolicy::Always,
        },
    }
}

/// The service fronting an Instance's worker pod.
pub fn desired_service(instance: &Instance, settings: &WorkloadSettings) -> Service {
    let name = instance.name();
    let metadata = ObjectMeta::new(instance.namespace(), service_name_for(name))
        .with_labels([(APP_LABEL, APP_LABEL_VALUE), (NAME_LABEL, name)]);

    Service {
        metadata,
        spec: ServiceSpec {
            selector: selector_for(name),
            ports: vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                port: SERVICE_PORT,
                target_port: settings.pod_port,
            }],
            service_type: ServiceType::ClusterIP,
        },
    }
}

/// Fields on which a running pod differs from the desired one.
///
/// Empty means the pod is up to date. Only fields that affect what runs are
/// compared; store-assigned metadata is ignored.
pub fn pod_drift(current: &Pod, desired: &Pod) -> Vec<&'static str> {
    let mut drift = Vec::new();

    match (current.spec.containers.as_slice(), desired.spec.containers.as_slice()) {
        ([have], [want]) => {
            if have.image != want.image {
                drift.push("image");
            }
            let have_port = match have.ports.as_slice() {
                [port] => Some(port.container_port),
                _ => None,
            };
            if have_port != want.ports.first().map(|p| p.container_port) {
                drift.push("ports");
            }
            if have.env_value(VERSION_ENV) != want.env_value(VERSION_ENV) {
                drift.push("version_env");
            }
        }
        _ => drift.push("containers"),
    }

    if current.metadata.labels.get(VERSION_LABEL) != desired.metadata.labels.get(VERSION_LABEL) {
        drift.push("version_label");
    }
    if current.spec.active_deadline_seconds != desired.spec.active_deadline_seconds {
        drift.push("deadline");
    }
    if current.spec.service_account_name != desired.spec.service_account_name {
        drift.push("identity");
    }

    drift
}

/// Fields on which a service differs from the desired one.
pub fn service_drift(current: &Service, desired: &Service) -> Vec<&'static str> {
    let mut drift = Vec::new();
    if current.spec.selector != desired.spec.selector {
        drift.push("selector");
    }
    let ports = |s: &Service| -> Vec<(u16, u16)> {
        s.spec.ports.iter().map(|p| (p.port, p.target_port)).collect()
    };
    if ports(current) != ports(desired) {
        drift.push("ports");
    }
    if current.spec.service_type != desired.spec.service_type {
        drift.push("type");
    }
    drift
}
