//! Deployment lifecycle operations
//!
//! There is no explicit state machine: whether a deployment was switched off
//! by this service is recorded in an annotation holding its replica count
//! before it was scaled to zero, and rolling restarts bump a serial label on
//! the pod template so the rollout controller replaces the pods.

use crate::aggregator::Aggregator;
use crate::error::{OnOffError, Result};
use crate::models::{DeletionOutcome, HardRestart, PodDeletion};
use crate::observability::{OnOffMetrics, StructuredLogger};
use crate::upstream::{get_as, validate_name, ApiPaths, KubeApi};
use k8s_openapi::api::apps::v1::Deployment;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Replica count remembered by scale-off
pub const ORIGINAL_REPLICAS_ANNOTATION: &str = "kubeonoff/original-replicas";

/// Pod template label bumped by rolling restarts
pub const ROLLING_RESTART_LABEL: &str = "kubeonoff/rolling-restart-serial";

/// Lines of log returned by [`Lifecycle::pod_log`]
const LOG_TAIL_LINES: u32 = 1000;

pub struct Lifecycle {
    api: Arc<dyn KubeApi>,
    aggregator: Arc<Aggregator>,
    paths: ApiPaths,
    /// Pods whose name contains this are spared by `delete_all_pods`
    self_marker: String,
    metrics: OnOffMetrics,
    logger: StructuredLogger,
}

impl Lifecycle {
    pub fn new(
        api: Arc<dyn KubeApi>,
        aggregator: Arc<Aggregator>,
        self_marker: impl Into<String>,
    ) -> Self {
        let paths = aggregator.paths().clone();
        let logger = StructuredLogger::new(paths.namespace());
        Self {
            api,
            aggregator,
            paths,
            self_marker: self_marker.into(),
            metrics: OnOffMetrics::new(),
            logger,
        }
    }

    fn deployment_path(&self, name: &str) -> Result<String> {
        Ok(self.paths.deployment(validate_name(name)?))
    }

    fn pod_path(&self, name: &str) -> Result<String> {
        Ok(self.paths.pod(validate_name(name)?))
    }

    async fn get_deployment(&self, name: &str) -> Result<Deployment> {
        get_as(self.api.as_ref(), &self.deployment_path(name)?).await
    }

    /// Audit and count an action.
    ///
    /// `summary` tells whether a completed action fully succeeded, and
    /// describes what it did.
    fn record<T>(
        &self,
        action: &str,
        name: &str,
        result: &Result<T>,
        summary: impl FnOnce(&T) -> (bool, String),
    ) {
        match result {
            Ok(value) => {
                let (succeeded, detail) = summary(value);
                self.metrics.inc_lifecycle_action(action, succeeded);
                if succeeded {
                    self.logger.log_action(action, name, &detail);
                } else {
                    self.logger.log_action_failed(action, name, &detail);
                }
            }
            Err(err) => {
                self.metrics.inc_lifecycle_action(action, false);
                self.logger.log_action_failed(action, name, &err.to_string());
            }
        }
    }

    /// Scale a deployment to zero, remembering its replica count.
    ///
    /// The remembered count is only written if not already present, so
    /// switching off an already switched off deployment keeps the count
    /// from the first time.
    pub async fn scale_off(&self, name: &str) -> Result<Value> {
        let result = self.try_scale_off(name).await;
        self.record("off", name, &result, |_| (true, "replicas=0".to_string()));
        result
    }

    async fn try_scale_off(&self, name: &str) -> Result<Value> {
        let deployment = self.get_deployment(name).await?;
        let mut annotations = deployment.metadata.annotations.clone().unwrap_or_default();
        if !annotations.contains_key(ORIGINAL_REPLICAS_ANNOTATION) {
            // The API server defaults an unset replica count to 1
            let current = deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1);
            annotations.insert(ORIGINAL_REPLICAS_ANNOTATION.to_string(), current.to_string());
        }

        let patch = json!({
            "metadata": {"annotations": annotations},
            "spec": {"replicas": 0},
        });
        self.api.merge_patch(&self.deployment_path(name)?, &patch).await
    }

    /// Restore the replica count remembered by [`Lifecycle::scale_off`].
    ///
    /// The annotation is kept, so later off/on cycles reuse it.
    pub async fn scale_on(&self, name: &str) -> Result<Value> {
        let result = self.try_scale_on(name).await;
        self.record("on", name, &result, |patched| {
            (true, format!("replicas={}", patched["spec"]["replicas"]))
        });
        result
    }

    async fn try_scale_on(&self, name: &str) -> Result<Value> {
        let deployment = self.get_deployment(name).await?;
        let replicas = original_replicas(name, &deployment)?;

        let patch = json!({"spec": {"replicas": replicas}});
        self.api.merge_patch(&self.deployment_path(name)?, &patch).await
    }

    /// Bump the rolling restart serial so the pods get replaced by a rollout
    pub async fn rolling_restart(&self, name: &str) -> Result<Value> {
        let result = self.try_rolling_restart(name).await;
        self.record("restart", name, &result, |_| {
            (true, "rollout triggered".to_string())
        });
        result
    }

    async fn try_rolling_restart(&self, name: &str) -> Result<Value> {
        let deployment = self.get_deployment(name).await?;
        let mut labels: BTreeMap<String, String> = deployment
            .spec
            .and_then(|spec| spec.template.metadata)
            .and_then(|metadata| metadata.labels)
            .unwrap_or_default();

        let serial = match labels.get(ROLLING_RESTART_LABEL) {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| OnOffError::InvalidRestartSerial {
                    name: name.to_string(),
                    value: value.clone(),
                })?,
            None => 0,
        };
        labels.insert(ROLLING_RESTART_LABEL.to_string(), (serial + 1).to_string());

        let patch = json!({"spec": {"template": {"metadata": {"labels": labels}}}});
        self.api.merge_patch(&self.deployment_path(name)?, &patch).await
    }

    /// Delete every pod of a deployment at once
    pub async fn hard_restart(&self, name: &str) -> Result<HardRestart> {
        let result = self.try_hard_restart(name).await;
        self.record("hard-restart", name, &result, |restart| {
            deletion_summary(&restart.deletions)
        });
        result
    }

    async fn try_hard_restart(&self, name: &str) -> Result<HardRestart> {
        let deployment = self.get_deployment(name).await?;
        let snapshot = self.aggregator.fetch_snapshot().await?;

        let deployment_uid = deployment.metadata.uid.clone().ok_or_else(|| {
            OnOffError::Decode(format!("deployment {name:?} has no metadata.uid"))
        })?;
        let pods: Vec<String> = snapshot
            .pods_of_deployment(&deployment_uid)
            .filter_map(|pod| pod.metadata.name.clone())
            .collect();

        let deletions = self.delete_pods(&pods).await;
        Ok(HardRestart {
            deployment,
            deletions,
        })
    }

    /// Delete every pod in the namespace except this service's own
    pub async fn delete_all_pods(&self) -> Result<Vec<PodDeletion>> {
        let result = self.try_delete_all_pods().await;
        self.record("delete-all", self.paths.namespace(), &result, |deletions| {
            deletion_summary(deletions)
        });
        result
    }

    async fn try_delete_all_pods(&self) -> Result<Vec<PodDeletion>> {
        let snapshot = self.aggregator.fetch_snapshot().await?;
        let pods: Vec<String> = snapshot
            .pods
            .items
            .iter()
            .filter_map(|pod| pod.metadata.name.clone())
            .filter(|name| !name.contains(&self.self_marker))
            .collect();

        Ok(self.delete_pods(&pods).await)
    }

    /// Delete pods one after the other, collecting every outcome
    async fn delete_pods(&self, names: &[String]) -> Vec<PodDeletion> {
        let mut deletions = Vec::with_capacity(names.len());
        for name in names {
            let outcome = match self.delete_one(name).await {
                Ok(result) => {
                    self.metrics.inc_pods_deleted();
                    self.logger.log_pod_deleted(name);
                    DeletionOutcome::Success { result }
                }
                Err(err) => {
                    let (status, body) = match err {
                        OnOffError::Upstream { status, body } => (status, body),
                        other => (other.status_code(), other.to_string()),
                    };
                    self.metrics.inc_pod_deletion_failures();
                    self.logger.log_pod_deletion_failed(name, status, &body);
                    DeletionOutcome::Failure { status, body }
                }
            };
            deletions.push(PodDeletion {
                pod_name: name.clone(),
                outcome,
            });
        }
        deletions
    }

    async fn delete_one(&self, name: &str) -> Result<Value> {
        self.api.delete(&self.pod_path(name)?).await
    }

    /// Delete a single pod
    pub async fn delete_pod(&self, name: &str) -> Result<Value> {
        let result = self.delete_one(name).await;
        match &result {
            Ok(_) => {
                self.metrics.inc_pods_deleted();
                self.logger.log_pod_deleted(name);
            }
            Err(err) => {
                self.metrics.inc_pod_deletion_failures();
                self.logger
                    .log_pod_deletion_failed(name, err.status_code(), &err.to_string());
            }
        }
        result
    }

    /// Last lines of a container's log
    pub async fn pod_log(&self, pod: &str, container: &str, timestamps: bool) -> Result<String> {
        let query = [
            ("tailLines", LOG_TAIL_LINES.to_string()),
            ("container", container.to_string()),
            ("timestamps", timestamps.to_string()),
        ];
        let path = self.paths.pod_log(validate_name(pod)?);
        self.api.get_text(&path, &query).await
    }
}

/// Whether every deletion went through, and a count for the audit log
fn deletion_summary(deletions: &[PodDeletion]) -> (bool, String) {
    let failed = deletions.iter().filter(|d| !d.is_success()).count();
    let detail = format!("deleted {} of {} pods", deletions.len() - failed, deletions.len());
    (failed == 0, detail)
}

/// Replica count remembered by scale-off
fn original_replicas(name: &str, deployment: &Deployment) -> Result<i32> {
    let not_stopped = |reason: String| OnOffError::NotPreviouslyStopped {
        name: name.to_string(),
        reason,
    };
    let value = deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(ORIGINAL_REPLICAS_ANNOTATION))
        .ok_or_else(|| {
            not_stopped(format!("annotation {ORIGINAL_REPLICAS_ANNOTATION} is missing"))
        })?;
    value
        .trim()
        .parse::<i32>()
        .map_err(|err| {
            not_stopped(format!("invalid {ORIGINAL_REPLICAS_ANNOTATION} {value:?}: {err}"))
        })
}
