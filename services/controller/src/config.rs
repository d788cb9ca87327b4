//! Controller configuration.
//!
//! Everything comes from `EPHEM_*` environment variables. The engine itself
//! never reads the environment; it receives the settings structs built here.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::dispatch::ControllerConfig;
use crate::expiry::ExpiryWorkerConfig;
use crate::routing::IngressSettings;
use crate::workload::WorkloadSettings;

pub const DEFAULT_TLS_SECRET: &str = "ephem-tls";

#[derive(Debug, Clone)]
pub struct Config {
    /// Public host name every route is served under.
    pub ingress_host: String,

    pub ingress_tls_secret: String,

    pub ingress_class_name: Option<String>,

    /// TTL for Instances without a positive override.
    pub default_ttl_seconds: i64,

    /// Execution identity for Instances that name none.
    pub pod_service_account: String,

    pub pod_port: u16,

    pub sweep_interval: Duration,

    /// Reconcile worker count.
    pub workers: usize,

    /// Optional JSON file of manifests loaded at startup.
    pub seed_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let ingress_host = non_empty("EPHEM_INGRESS_FQDN")
            .context("Missing ingress host. Set EPHEM_INGRESS_FQDN.")?;

        let ingress_tls_secret =
            non_empty("EPHEM_INGRESS_TLS_SECRET").unwrap_or_else(|| DEFAULT_TLS_SECRET.to_string());

        let ingress_class_name = non_empty("EPHEM_INGRESS_CLASSNAME");

        let default_ttl_seconds: i64 = non_empty("EPHEM_DEFAULT_TTL_SECONDS")
            .map(|v| v.trim().parse())
            .transpose()
            .context("EPHEM_DEFAULT_TTL_SECONDS must be an integer (seconds).")?
            .unwrap_or(3600);
        if default_ttl_seconds <= 0 {
            bail!("EPHEM_DEFAULT_TTL_SECONDS must be positive, got {default_ttl_seconds}");
        }

        let pod_service_account = non_empty("EPHEM_POD_SERVICEACCOUNT")
            .unwrap_or_else(|| crate::ttl::FALLBACK_IDENTITY.to_string());

        let pod_port: u16 = non_empty("EPHEM_POD_PORT")
            .map(|v| v.trim().parse())
            .transpose()
            .context("EPHEM_POD_PORT must be a port number.")?
            .unwrap_or(8080);
        if pod_port == 0 {
            bail!("EPHEM_POD_PORT must be between 1 and 65535");
        }

        let sweep_interval_secs: u64 = non_empty("EPHEM_SWEEP_INTERVAL_SECS")
            .map(|v| v.trim().parse())
            .transpose()
            .context("EPHEM_SWEEP_INTERVAL_SECS must be an integer (seconds).")?
            .unwrap_or(60);
        let sweep_interval = Duration::from_secs(sweep_interval_secs.max(1));

        let workers: usize = non_empty("EPHEM_WORKERS")
            .map(|v| v.trim().parse())
            .transpose()
            .context("EPHEM_WORKERS must be an integer.")?
            .unwrap_or(4)
            .max(1);

        let seed_file = non_empty("EPHEM_SEED_FILE").map(PathBuf::from);

        let log_level = non_empty("EPHEM_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            ingress_host,
            ingress_tls_secret,
            ingress_class_name,
            default_ttl_seconds,
            pod_service_account,
            pod_port,
            sweep_interval,
            workers,
            seed_file,
            log_level,
        })
    }

    pub fn workload_settings(&self) -> WorkloadSettings {
        WorkloadSettings {
            default_ttl_seconds: self.default_ttl_seconds,
            default_identity: self.pod_service_account.clone(),
            pod_port: self.pod_port,
        }
    }

    pub fn ingress_settings(&self) -> IngressSettings {
        IngressSettings {
            host: Some(self.ingress_host.clone()),
            tls_secret: Some(self.ingress_tls_secret.clone()),
            class_name: self.ingress_class_name.clone(),
        }
    }

    pub fn expiry_config(&self) -> ExpiryWorkerConfig {
        ExpiryWorkerConfig {
            interval: self.sweep_interval,
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            ..Default::default()
        }
    }
}
