//! Health tracking for the control service
//!
//! The service holds no state of its own worth probing, so health is what it
//! last saw from its two dependencies: the core Kubernetes API and the
//! `metrics.k8s.io` API. Exposed through `/healthz` and `/readyz`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Answers are incomplete but still useful
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix time of the last observation
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn observed(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::observed(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::observed(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::observed(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status among the components, healthy when there are none
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    /// Core Kubernetes API (deployments, pods, replica sets, daemon sets)
    pub const UPSTREAM: &str = "upstream";
    /// `metrics.k8s.io` API; only ever degraded, never fatal
    pub const METRICS_API: &str = "metrics_api";
}

#[derive(Debug, Default)]
struct HealthState {
    started: bool,
    components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a component, healthy until told otherwise
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.started = ready;
    }

    /// Record the outcome of a call to the core Kubernetes API
    pub async fn record_upstream<T, E: Display>(&self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.set_healthy(components::UPSTREAM).await,
            Err(err) => self.set_unhealthy(components::UPSTREAM, err.to_string()).await,
        }
    }

    /// Record the outcome of a call to the metrics API
    pub async fn record_metrics_api<T, E: Display>(&self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.set_healthy(components::METRICS_API).await,
            Err(err) => self.set_degraded(components::METRICS_API, err.to_string()).await,
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.state.read().await.components.clone();
        HealthResponse {
            status: HealthResponse::compute_status(&components),
            components,
        }
    }

    /// Ready once started, as long as the Kubernetes API answers
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let upstream_down = state
            .components
            .get(components::UPSTREAM)
            .filter(|health| health.status == ComponentStatus::Unhealthy);

        let reason = if !state.started {
            Some("Service not yet initialized".to_string())
        } else if let Some(health) = upstream_down {
            Some(format!(
                "Kubernetes API unreachable: {}",
                health.message.as_deref().unwrap_or("no answer")
            ))
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> HealthRegistry {
        let registry = HealthRegistry::new();
        registry.register(components::UPSTREAM).await;
        registry.register(components::METRICS_API).await;
        registry
    }

    #[tokio::test]
    async fn test_nothing_registered_is_healthy() {
        let health = HealthRegistry::new().health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_worst_component_wins() {
        let registry = registry().await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        registry
            .set_degraded(components::METRICS_API, "metrics-server returned 503")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_unhealthy(components::UPSTREAM, "connection refused")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_record_upstream_tracks_last_outcome() {
        let registry = registry().await;

        registry
            .record_upstream::<(), _>(&Err("forbidden (403)"))
            .await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert_eq!(
            health.components[components::UPSTREAM].message.as_deref(),
            Some("forbidden (403)")
        );

        registry.record_upstream::<(), &str>(&Ok(())).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_metrics_api_failure_only_degrades() {
        let registry = registry().await;
        registry.set_ready(true).await;

        registry
            .record_metrics_api::<(), _>(&Err("the server could not find the requested resource"))
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness() {
        let registry = registry().await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Service not yet initialized"));

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .set_unhealthy(components::UPSTREAM, "connection refused")
            .await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("connection refused"));
    }
}
