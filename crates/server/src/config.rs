//! Service configuration

use anyhow::{Context, Result};
use onoff_lib::{AggregatorConfig, KubeApiConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, read from `KUBEONOFF_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Namespace the service manages (downward API `POD_NAMESPACE` by default)
    #[serde(default)]
    pub namespace: String,

    /// Port of the HTTP API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Kubernetes API server
    #[serde(default = "default_kube_api_url")]
    pub kube_api_url: String,

    /// Service account token; empty to send no credentials
    #[serde(default = "default_token_path")]
    pub token_path: String,

    /// CA bundle of the API server; empty to use the system roots
    #[serde(default = "default_ca_path")]
    pub ca_path: String,

    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_secs: u64,

    #[serde(default = "default_metrics_ttl")]
    pub metrics_ttl_secs: u64,

    /// How often idle cache keys are released
    #[serde(default = "default_cache_sweep_interval")]
    pub cache_sweep_interval_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Header carrying the user name set by the authenticating proxy
    #[serde(default)]
    pub auth_user_header: Option<String>,

    /// Comma separated list of extensions to load
    #[serde(default)]
    pub extensions: String,

    /// Pods whose name contains this are never deleted by "delete all"
    #[serde(default = "default_self_marker")]
    pub self_marker: String,
}

fn default_api_port() -> u16 {
    80
}

fn default_kube_api_url() -> String {
    "https://kubernetes.default".to_string()
}

fn default_token_path() -> String {
    "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string()
}

fn default_ca_path() -> String {
    "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt".to_string()
}

fn default_snapshot_ttl() -> u64 {
    2
}

fn default_metrics_ttl() -> u64 {
    60
}

fn default_cache_sweep_interval() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

fn default_self_marker() -> String {
    "kubeonoff".to_string()
}

fn optional_path(path: &str) -> Option<PathBuf> {
    (!path.is_empty()).then(|| PathBuf::from(path))
}

impl ServiceConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("KUBEONOFF"))
            .build()
            .context("Failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid KUBEONOFF_* configuration")?;
        config.with_pod_namespace(std::env::var("POD_NAMESPACE").ok())
    }

    /// Fall back to the namespace the pod runs in; there is no default namespace.
    pub fn with_pod_namespace(mut self, pod_namespace: Option<String>) -> Result<Self> {
        if self.namespace.trim().is_empty() {
            self.namespace = pod_namespace
                .map(|ns| ns.trim().to_string())
                .filter(|ns| !ns.is_empty())
                .context("No namespace configured: set KUBEONOFF_NAMESPACE or POD_NAMESPACE")?;
        }
        Ok(self)
    }

    pub fn kube_api(&self) -> KubeApiConfig {
        KubeApiConfig {
            base_url: self.kube_api_url.clone(),
            token_path: optional_path(&self.token_path),
            ca_path: optional_path(&self.ca_path),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            snapshot_ttl: Duration::from_secs(self.snapshot_ttl_secs),
            metrics_ttl: Duration::from_secs(self.metrics_ttl_secs),
        }
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs.max(1))
    }

    /// Names of the extensions to load, in order
    pub fn extension_names(&self) -> Vec<String> {
        self.extensions
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}
