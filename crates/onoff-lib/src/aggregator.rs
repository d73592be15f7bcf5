//! Aggregated view of the namespace
//!
//! The [`Aggregator`] fetches deployments, pods, daemon sets and replica sets
//! concurrently, joins replica sets to the deployments that own them and
//! enriches the result with per-container utilization taken from the
//! metrics API. Two caches sit in front of it: one for the whole snapshot
//! (short expiry, protects the API server from dashboards polling in
//! parallel) and one for the metrics (the metrics pipeline only refreshes
//! about once a minute).

use crate::cache::TtlCache;
use crate::error::{OnOffError, Result};
use crate::health::HealthRegistry;
use crate::models::{
    ContainerMetric, MetricsMap, OwnershipIndex, PodMetrics, ResourceList, ResourceSnapshot,
};
use crate::quantity::{parse_cpu, parse_memory};
use crate::upstream::{get_as, ApiPaths, KubeApi};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Owner reference kind linking a replica set to its deployment
const DEPLOYMENT_KIND: &str = "Deployment";

/// Expiry settings for the two caches
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub snapshot_ttl: Duration,
    pub metrics_ttl: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(2),
            metrics_ttl: Duration::from_secs(60),
        }
    }
}

pub struct Aggregator {
    api: Arc<dyn KubeApi>,
    paths: ApiPaths,
    health: HealthRegistry,
    snapshots: TtlCache<(), Arc<ResourceSnapshot>>,
    metrics: TtlCache<(), Option<MetricsMap>>,
}

impl Aggregator {
    pub fn new(
        api: Arc<dyn KubeApi>,
        paths: ApiPaths,
        health: HealthRegistry,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            api,
            paths,
            health,
            snapshots: TtlCache::new("snapshot", config.snapshot_ttl),
            metrics: TtlCache::new("metrics", config.metrics_ttl),
        }
    }

    pub fn paths(&self) -> &ApiPaths {
        &self.paths
    }

    /// Current snapshot, from cache when it is recent enough
    pub async fn fetch_snapshot(&self) -> Result<Arc<ResourceSnapshot>> {
        self.snapshots
            .get_or_compute((), || self.build_snapshot())
            .await
    }

    async fn build_snapshot(&self) -> Result<Arc<ResourceSnapshot>> {
        let api = self.api.as_ref();
        let (deployments_path, pods_path, daemon_sets_path, replica_sets_path) = (
            self.paths.deployments(),
            self.paths.pods(),
            self.paths.daemon_sets(),
            self.paths.replica_sets(),
        );

        let fetched = tokio::try_join!(
            get_as::<ResourceList<Deployment>>(api, &deployments_path),
            get_as::<ResourceList<Pod>>(api, &pods_path),
            get_as::<ResourceList<DaemonSet>>(api, &daemon_sets_path),
            get_as::<ResourceList<ReplicaSet>>(api, &replica_sets_path),
        );
        self.health.record_upstream(&fetched).await;
        let (deployments, pods, daemon_sets, replica_sets) = fetched?;

        let replica_set_owners = ownership_index(&replica_sets.items);
        let metrics = self.fetch_metrics(&pods).await;

        debug!(
            deployments = deployments.items.len(),
            pods = pods.items.len(),
            daemon_sets = daemon_sets.items.len(),
            replica_sets = replica_sets.items.len(),
            with_metrics = metrics.is_some(),
            "Built resource snapshot"
        );

        Ok(Arc::new(ResourceSnapshot {
            deployments,
            pods,
            daemon_sets,
            replica_sets,
            replica_set_owners,
            metrics,
        }))
    }

    /// Per-container utilization, or `None` if the metrics API failed.
    ///
    /// `pods` is only used to look up container limits; it does not take
    /// part in the cache key, so within the metrics expiry the map may have
    /// been computed against an earlier pod list.
    pub async fn fetch_metrics(&self, pods: &ResourceList<Pod>) -> Option<MetricsMap> {
        let cached = self
            .metrics
            .get_or_compute((), || async {
                let path = self.paths.pod_metrics();
                let fetched = get_as::<ResourceList<PodMetrics>>(self.api.as_ref(), &path)
                    .await
                    .map_err(|err| OnOffError::MetricsUnavailable(err.to_string()));
                self.health.record_metrics_api(&fetched).await;
                match fetched {
                    Ok(usage) => {
                        Ok::<_, Infallible>(Some(compute_metrics(&usage.items, &pods.items)))
                    }
                    Err(err) => {
                        warn!(error = %err, "Got error fetching the API metrics");
                        Ok(None)
                    }
                }
            })
            .await;

        match cached {
            Ok(metrics) => metrics,
            Err(never) => match never {},
        }
    }

    /// Forget cached snapshots and metrics
    pub async fn invalidate(&self) {
        self.snapshots.clear().await;
        self.metrics.clear().await;
        info!("Resource caches cleared");
    }

    /// Release idle cache keys, see [`TtlCache::sweep`]
    pub fn sweep_caches(&self) -> usize {
        self.snapshots.sweep() + self.metrics.sweep()
    }
}

/// Map every replica set uid to the uid of the deployment owning it.
///
/// Old replica sets of a deployment map to the same owner as the current
/// one, which is harmless: they only add keys.
pub fn ownership_index(replica_sets: &[ReplicaSet]) -> OwnershipIndex {
    let mut index = HashMap::new();
    for replica_set in replica_sets {
        let Some(uid) = replica_set.metadata.uid.as_ref() else {
            continue;
        };
        for owner in replica_set.metadata.owner_references.iter().flatten() {
            if owner.kind != DEPLOYMENT_KIND {
                continue;
            }
            index.insert(uid.clone(), owner.uid.clone());
        }
    }
    index
}

/// Join metrics API usage with the pods' declared limits.
pub fn compute_metrics(usage: &[PodMetrics], pods: &[Pod]) -> MetricsMap {
    let pod_index: HashMap<&str, &Pod> = pods
        .iter()
        .filter_map(|pod| pod.metadata.name.as_deref().map(|name| (name, pod)))
        .collect();

    let mut metrics = MetricsMap::new();
    for pod_usage in usage {
        let Some(pod_name) = pod_usage.metadata.name.as_deref() else {
            continue;
        };
        let Some(pod) = pod_index.get(pod_name) else {
            debug!(pod = pod_name, "Metrics for a pod missing from the pod list");
            continue;
        };
        let specs = pod
            .spec
            .as_ref()
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default();

        let mut pod_metrics = BTreeMap::new();
        for container in &pod_usage.containers {
            let Some(spec) = specs.iter().find(|spec| spec.name == container.name) else {
                continue;
            };
            let metric =
                container_metric(pod_name, container.name.as_str(), &container.usage, spec);
            if !metric.is_empty() {
                pod_metrics.insert(container.name.clone(), metric);
            }
        }

        if !pod_metrics.is_empty() {
            metrics.insert(pod_name.to_string(), pod_metrics);
        }
    }
    metrics
}

fn container_metric(
    pod_name: &str,
    container_name: &str,
    usage: &BTreeMap<String, Quantity>,
    spec: &Container,
) -> ContainerMetric {
    let limits = spec.resources.as_ref().and_then(|r| r.limits.as_ref());
    let limit = |resource: &str| limits.and_then(|l| l.get(resource)).map(|q| q.0.as_str());
    let used = |resource: &str| usage.get(resource).map(|q| q.0.as_str());

    let ratio = |resource: &str, parse: fn(&str) -> Result<f64>| -> Option<f64> {
        let (used, limit) = (used(resource)?, limit(resource)?);
        match (parse(used), parse(limit)) {
            (Ok(used), Ok(limit)) => Some(used / limit),
            (Err(err), _) | (_, Err(err)) => {
                debug!(
                    pod = pod_name,
                    container = container_name,
                    resource,
                    error = %err,
                    "Skipping unparseable quantity"
                );
                None
            }
        }
    };

    ContainerMetric {
        cpu_ratio: ratio("cpu", parse_cpu),
        mem_ratio: ratio("memory", |q| parse_memory(q).map(|bytes| bytes as f64)),
    }
}
