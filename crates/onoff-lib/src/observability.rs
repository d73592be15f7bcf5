//! Observability infrastructure for the control service
//!
//! Provides:
//! - Prometheus metrics (cache efficiency, upstream latency and errors, lifecycle actions)
//! - Structured audit logging of every mutating operation with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for Kubernetes API round trips (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OnOffMetricsInner> = OnceLock::new();

struct OnOffMetricsInner {
    cache_requests: IntCounterVec,
    upstream_latency_seconds: Histogram,
    upstream_errors: IntCounterVec,
    lifecycle_actions: IntCounterVec,
    pods_deleted: IntCounter,
    pod_deletion_failures: IntCounter,
}

impl OnOffMetricsInner {
    fn new() -> Self {
        Self {
            cache_requests: register_int_counter_vec!(
                "kubeonoff_cache_requests_total",
                "Cache lookups by cache and result (hit or miss)",
                &["cache", "result"]
            )
            .expect("Failed to register cache_requests"),

            upstream_latency_seconds: register_histogram!(
                "kubeonoff_upstream_request_duration_seconds",
                "Time spent waiting for the Kubernetes API",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register upstream_latency_seconds"),

            upstream_errors: register_int_counter_vec!(
                "kubeonoff_upstream_errors_total",
                "Kubernetes API calls that failed, by HTTP status (0 for transport errors)",
                &["status"]
            )
            .expect("Failed to register upstream_errors"),

            lifecycle_actions: register_int_counter_vec!(
                "kubeonoff_lifecycle_actions_total",
                "Lifecycle operations requested, by action and outcome",
                &["action", "outcome"]
            )
            .expect("Failed to register lifecycle_actions"),

            pods_deleted: register_int_counter!(
                "kubeonoff_pods_deleted_total",
                "Pods deleted by restart and delete operations"
            )
            .expect("Failed to register pods_deleted"),

            pod_deletion_failures: register_int_counter!(
                "kubeonoff_pod_deletion_failures_total",
                "Pod deletions rejected by the Kubernetes API"
            )
            .expect("Failed to register pod_deletion_failures"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics.
///
/// Multiple clones share the same underlying metrics.
#[derive(Clone, Debug)]
pub struct OnOffMetrics {
    _private: (),
}

impl Default for OnOffMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OnOffMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OnOffMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OnOffMetricsInner {
        GLOBAL_METRICS.get_or_init(OnOffMetricsInner::new)
    }

    pub fn inc_cache_hit(&self, cache: &str) {
        self.inner()
            .cache_requests
            .with_label_values(&[cache, "hit"])
            .inc();
    }

    pub fn inc_cache_miss(&self, cache: &str) {
        self.inner()
            .cache_requests
            .with_label_values(&[cache, "miss"])
            .inc();
    }

    pub fn cache_requests(&self, cache: &str, result: &str) -> u64 {
        self.inner()
            .cache_requests
            .with_label_values(&[cache, result])
            .get()
    }

    pub fn observe_upstream_latency(&self, duration_secs: f64) {
        self.inner().upstream_latency_seconds.observe(duration_secs);
    }

    /// `status` is 0 when the request never got an HTTP answer.
    pub fn inc_upstream_error(&self, status: u16) {
        self.inner()
            .upstream_errors
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    pub fn inc_lifecycle_action(&self, action: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner()
            .lifecycle_actions
            .with_label_values(&[action, outcome])
            .inc();
    }

    /// Current value of the lifecycle counter; `outcome` is `success` or `failure`
    pub fn lifecycle_actions(&self, action: &str, outcome: &str) -> u64 {
        self.inner()
            .lifecycle_actions
            .with_label_values(&[action, outcome])
            .get()
    }

    pub fn inc_pods_deleted(&self) {
        self.inner().pods_deleted.inc();
    }

    pub fn inc_pod_deletion_failures(&self) {
        self.inner().pod_deletion_failures.inc();
    }
}

/// Structured logger for operator actions
///
/// Every mutating request is logged with the namespace it acted on and the
/// user reported by the authenticating proxy in front of the service.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn log_startup(&self, version: &str, extensions: &[String]) {
        info!(
            event = "startup",
            namespace = %self.namespace,
            version = %version,
            extensions = ?extensions,
            "kubeonoff starting"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "shutdown",
            namespace = %self.namespace,
            reason = %reason,
            "kubeonoff shutting down"
        );
    }

    /// Log an incoming request together with the proxy-reported user
    pub fn log_request(&self, user: &str, method: &str, path: &str) {
        info!(
            event = "request",
            namespace = %self.namespace,
            user = %user,
            method = %method,
            path = %path,
            "Request received"
        );
    }

    /// Log a completed lifecycle action on a deployment
    pub fn log_action(&self, action: &str, deployment: &str, detail: &str) {
        info!(
            event = "lifecycle_action",
            namespace = %self.namespace,
            action = %action,
            deployment = %deployment,
            detail = %detail,
            "Lifecycle action applied"
        );
    }

    /// Log a lifecycle action the Kubernetes API or a precondition rejected
    pub fn log_action_failed(&self, action: &str, deployment: &str, error: &str) {
        warn!(
            event = "lifecycle_action_failed",
            namespace = %self.namespace,
            action = %action,
            deployment = %deployment,
            error = %error,
            "Lifecycle action failed"
        );
    }

    pub fn log_pod_deleted(&self, pod_name: &str) {
        info!(
            event = "pod_deleted",
            namespace = %self.namespace,
            pod_name = %pod_name,
            "Pod deleted"
        );
    }

    pub fn log_pod_deletion_failed(&self, pod_name: &str, status: u16, body: &str) {
        warn!(
            event = "pod_deletion_failed",
            namespace = %self.namespace,
            pod_name = %pod_name,
            status = status,
            body = %body.trim(),
            "Pod deletion failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_state() {
        let first = OnOffMetrics::new();
        let second = first.clone();

        let before = first.cache_requests("observability-test", "hit");
        second.inc_cache_hit("observability-test");
        assert_eq!(first.cache_requests("observability-test", "hit"), before + 1);
    }

    #[test]
    fn test_metrics_are_exposed_to_default_registry() {
        let metrics = OnOffMetrics::new();
        metrics.inc_lifecycle_action("off", true);
        metrics.inc_upstream_error(404);

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"kubeonoff_lifecycle_actions_total".to_string()));
        assert!(names.contains(&"kubeonoff_upstream_errors_total".to_string()));
    }
}
