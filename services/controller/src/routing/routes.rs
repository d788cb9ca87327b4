//! Route derivation.

use ephem_objects::Instance;

use crate::workload::service_name_for;

/// Canonical form of a user-supplied route prefix.
///
/// Surrounding whitespace and every empty path segment are dropped, so
/// `"  //apps//v1/ "` becomes `"apps/v1"` and `"/"` becomes `""`.
pub fn normalize_prefix(raw: &str) -> String {
    raw.trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Public path of an Instance: `/<name>` or `/<prefix>/<name>`.
pub fn route_path(prefix: &str, name: &str) -> String {
    let prefix = normalize_prefix(prefix);
    if prefix.is_empty() {
        format!("/{name}")
    } else {
        format!("/{prefix}/{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub service_name: String,
}

/// Routes for every Instance in a namespace, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn from_instances(instances: &[Instance]) -> Self {
        let mut routes: Vec<Route> = instances
            .iter()
            .map(|inst| Route {
                path: route_path(inst.spec.route_prefix.as_deref().unwrap_or(""), inst.name()),
                service_name: service_name_for(inst.name()),
            })
            .collect();
        routes.sort_by(|a, b| a.path.cmp(&b.path));
        routes.dedup_by(|a, b| a.path == b.path);
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}
