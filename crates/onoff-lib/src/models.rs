//! Core data models for the control service

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A list response from the Kubernetes API (`DeploymentList`, `PodList`, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> ResourceList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            api_version: None,
            kind: None,
            metadata: ListMeta::default(),
            items,
        }
    }
}

/// `metrics.k8s.io/v1beta1` PodMetrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetrics {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub containers: Vec<ContainerUsage>,
}

/// Usage figures of one container in a [`PodMetrics`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    #[serde(default)]
    pub usage: BTreeMap<String, Quantity>,
}

/// Utilization of one container relative to its declared limits
///
/// A ratio is only present when the container declares a limit for that
/// resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_ratio: Option<f64>,
}

impl ContainerMetric {
    pub fn is_empty(&self) -> bool {
        self.cpu_ratio.is_none() && self.mem_ratio.is_none()
    }
}

/// Pod name -> container name -> utilization
pub type MetricsMap = BTreeMap<String, BTreeMap<String, ContainerMetric>>;

/// Replica set uid -> uid of the owning deployment
pub type OwnershipIndex = HashMap<String, String>;

/// Everything the dashboard shows, fetched in one go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub deployments: ResourceList<Deployment>,
    pub pods: ResourceList<Pod>,
    #[serde(rename = "daemonsets")]
    pub daemon_sets: ResourceList<DaemonSet>,
    #[serde(rename = "replicasets")]
    pub replica_sets: ResourceList<ReplicaSet>,
    #[serde(rename = "replicaset_deployment_map")]
    pub replica_set_owners: OwnershipIndex,
    /// `None` when the metrics API could not be reached
    pub metrics: Option<MetricsMap>,
}

impl ResourceSnapshot {
    /// Uid of the deployment owning `pod` through one of its replica sets
    pub fn owning_deployment(&self, pod: &Pod) -> Option<&str> {
        pod.metadata
            .owner_references
            .iter()
            .flatten()
            .find_map(|owner| self.replica_set_owners.get(&owner.uid))
            .map(String::as_str)
    }

    /// Pods owned, through a replica set, by the deployment with `deployment_uid`
    pub fn pods_of_deployment<'a>(
        &'a self,
        deployment_uid: &'a str,
    ) -> impl Iterator<Item = &'a Pod> {
        self.pods.items.iter().filter(move |pod| {
            pod.metadata
                .owner_references
                .iter()
                .flatten()
                .any(|owner| {
                    self.replica_set_owners.get(&owner.uid).map(String::as_str)
                        == Some(deployment_uid)
                })
        })
    }
}

/// Result of deleting one pod as part of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodDeletion {
    pub pod_name: String,
    pub outcome: DeletionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeletionOutcome {
    /// The API accepted the deletion; `result` is its answer
    Success { result: serde_json::Value },
    /// The API (or the transport) rejected the deletion
    Failure { status: u16, body: String },
}

impl PodDeletion {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DeletionOutcome::Success { .. })
    }
}

/// Outcome of a hard restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardRestart {
    pub deployment: Deployment,
    pub deletions: Vec<PodDeletion>,
}
