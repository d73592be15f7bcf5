//! Core library of the kubeonoff control service
//!
//! This crate provides:
//! - Kubernetes quantity parsing
//! - A single-flight TTL cache for upstream reads
//! - The aggregated namespace snapshot (deployments, pods, ownership, utilization)
//! - Deployment lifecycle operations (on/off, rolling and hard restarts)
//! - Health checks, metrics and the extension registry

pub mod aggregator;
pub mod cache;
pub mod error;
pub mod extensions;
pub mod health;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod upstream;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use cache::TtlCache;
pub use error::{OnOffError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use lifecycle::Lifecycle;
pub use models::*;
pub use observability::{OnOffMetrics, StructuredLogger};
pub use upstream::{ApiPaths, HttpKubeApi, KubeApi, KubeApiConfig};
