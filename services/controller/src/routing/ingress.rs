//! Desired ingress and default backend objects, plus drift detection.

use std::collections::BTreeMap;

use ephem_objects::{
    Container, ContainerPort, HttpIngressPath, HttpIngressRuleValue, Ingress, IngressBackend,
    IngressRule, IngressSpec, IngressTls, ObjectMeta, PathType, Pod, PodSpec, PullPolicy,
    RestartPolicy, Service, ServicePort, ServiceSpec, ServiceType,
};

use super::RouteTable;
use crate::workload::{APP_LABEL, APP_LABEL_VALUE, PORT_NAME, SERVICE_PORT};

/// Name of the single ingress kept in each namespace.
pub const INGRESS_NAME: &str = "ephem-global-ingress";

pub const DEFAULT_BACKEND_NAME: &str = "ephem-default-backend";
pub const DEFAULT_BACKEND_IMAGE: &str = "nginxdemos/hello";
pub const DEFAULT_BACKEND_CONTAINER: &str = "backend";
pub const DEFAULT_BACKEND_PORT: u16 = 80;

/// Ingress settings. `host: None` means aggregation cannot run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressSettings {
    pub host: Option<String>,

    /// Secret holding the certificate; `None` omits the TLS block.
    pub tls_secret: Option<String>,

    pub class_name: Option<String>,
}

fn default_backend_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), DEFAULT_BACKEND_NAME.to_string())])
}

/// Catch-all pod serving requests no route matches.
pub fn default_backend_pod(namespace: &str) -> Pod {
    let mut metadata = ObjectMeta::new(namespace, DEFAULT_BACKEND_NAME);
    metadata.labels = default_backend_labels();

    Pod {
        metadata,
        spec: PodSpec {
            containers: vec![Container {
                name: DEFAULT_BACKEND_CONTAINER.to_string(),
                image: DEFAULT_BACKEND_IMAGE.to_string(),
                image_pull_policy: PullPolicy::IfNotPresent,
                ports: vec![ContainerPort {
                    name: Some(PORT_NAME.to_string()),
                    container_port: DEFAULT_BACKEND_PORT,
                }],
                ..Default::default()
            }],
            restart_policy: RestartPolicy::Always,
            ..Default::default()
        },
    }
}

pub fn default_backend_service(namespace: &str) -> Service {
    let mut metadata = ObjectMeta::new(namespace, DEFAULT_BACKEND_NAME);
    metadata.labels = default_backend_labels();

    Service {
        metadata,
        spec: ServiceSpec {
            selector: default_backend_labels(),
            ports: vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                port: DEFAULT_BACKEND_PORT,
                target_port: DEFAULT_BACKEND_PORT,
            }],
            service_type: ServiceType::ClusterIP,
        },
    }
}

/// Ingress for a namespace: one rule for `host`, one prefix path per route.
///
/// With no routes the rule keeps its host and carries no HTTP block.
pub fn desired_ingress(
    namespace: &str,
    host: &str,
    table: &RouteTable,
    settings: &IngressSettings,
) -> Ingress {
    let metadata =
        ObjectMeta::new(namespace, INGRESS_NAME).with_labels([(APP_LABEL, APP_LABEL_VALUE)]);

    let http = (!table.is_empty()).then(|| HttpIngressRuleValue {
        paths: table
            .routes()
            .iter()
            .map(|route| HttpIngressPath {
                path: route.path.clone(),
                path_type: PathType::Prefix,
                backend: IngressBackend::new(route.service_name.clone(), SERVICE_PORT),
            })
            .collect(),
    });

    let tls = settings
        .tls_secret
        .iter()
        .map(|secret| IngressTls {
            hosts: vec![host.to_string()],
            secret_name: secret.clone(),
        })
        .collect();

    Ingress {
        metadata,
        spec: IngressSpec {
            ingress_class_name: settings.class_name.clone(),
            default_backend: Some(IngressBackend::new(DEFAULT_BACKEND_NAME, DEFAULT_BACKEND_PORT)),
            tls,
            rules: vec![IngressRule {
                host: host.to_string(),
                http,
            }],
        },
    }
}

fn rule_paths(rule: &IngressRule) -> Vec<(&str, &str, u16)> {
    rule.http
        .iter()
        .flat_map(|http| http.paths.iter())
        .map(|p| {
            (
                p.path.as_str(),
                p.backend.service_name.as_str(),
                p.backend.service_port,
            )
        })
        .collect()
}

/// Fields on which an ingress differs from the desired one.
///
/// Compares class, default backend, TLS entries, rule hosts and each rule's
/// paths with their backends. A rule with an empty HTTP block differs from a
/// bare host rule. Path types and metadata are ignored.
pub fn ingress_drift(current: &Ingress, desired: &Ingress) -> Vec<&'static str> {
    let (have, want) = (&current.spec, &desired.spec);
    let mut drift = Vec::new();

    if have.ingress_class_name != want.ingress_class_name {
        drift.push("class");
    }
    if have.default_backend != want.default_backend {
        drift.push("default_backend");
    }
    if have.tls != want.tls {
        drift.push("tls");
    }

    let hosts = |spec: &IngressSpec| -> Vec<String> {
        spec.rules.iter().map(|r| r.host.clone()).collect()
    };
    if hosts(have) != hosts(want) {
        drift.push("rules");
    } else if have
        .rules
        .iter()
        .zip(&want.rules)
        .any(|(a, b)| a.http.is_some() != b.http.is_some() || rule_paths(a) != rule_paths(b))
    {
        drift.push("paths");
    }

    drift
}
