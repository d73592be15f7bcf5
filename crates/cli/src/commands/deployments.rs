//! Namespace overview and deployment lifecycle commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, Deployment, HardRestart, Snapshot};
use crate::commands::pods::print_deletions;
use crate::output::{
    color_ratio, color_status, print_json, print_success, print_table, OutputFormat,
};

#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Deployment")]
    name: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Ready")]
    ready: String,
    #[tabled(rename = "State")]
    state: String,
}

#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Pod")]
    name: String,
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

/// Running, stopped by onoff, or somewhere in between
fn deployment_state(deployment: &Deployment) -> &'static str {
    let desired = deployment.spec.replicas.unwrap_or(1);
    let ready = deployment.status.ready_replicas.unwrap_or(0);
    match (desired, deployment.original_replicas()) {
        (0, Some(_)) => "Stopped",
        (0, None) => "Scaled to zero",
        _ if ready >= desired => "Ready",
        _ => "Scaling",
    }
}

fn deployment_row(deployment: &Deployment) -> DeploymentRow {
    let replicas = match (deployment.spec.replicas, deployment.original_replicas()) {
        (Some(0), Some(original)) => format!("0 (was {})", original),
        (replicas, _) => replicas.unwrap_or(1).to_string(),
    };
    DeploymentRow {
        name: deployment.metadata.name.clone(),
        replicas,
        ready: deployment.status.ready_replicas.unwrap_or(0).to_string(),
        state: color_status(deployment_state(deployment)),
    }
}

fn pod_rows(snapshot: &Snapshot) -> Vec<PodRow> {
    let mut rows = Vec::new();
    for pod in &snapshot.pods.items {
        let name = pod.metadata.name.clone();
        let deployment = snapshot.deployment_of(pod).unwrap_or("-").to_string();
        let phase = color_status(pod.status.phase.as_deref().unwrap_or("Unknown"));
        let containers = snapshot
            .metrics
            .as_ref()
            .and_then(|metrics| metrics.get(&name));

        match containers {
            Some(containers) if !containers.is_empty() => {
                for (container, metric) in containers {
                    rows.push(PodRow {
                        name: name.clone(),
                        deployment: deployment.clone(),
                        phase: phase.clone(),
                        container: container.clone(),
                        cpu: color_ratio(metric.cpu_ratio),
                        memory: color_ratio(metric.mem_ratio),
                    });
                }
            }
            _ => rows.push(PodRow {
                name,
                deployment,
                phase,
                container: "-".to_string(),
                cpu: color_ratio(None),
                memory: color_ratio(None),
            }),
        }
    }
    rows
}

/// Show deployments and pods of the namespace with their utilization
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshot: Snapshot = client.get(&["v1", "all"]).await?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            println!("{}", "Deployments".bold());
            let rows: Vec<DeploymentRow> =
                snapshot.deployments.items.iter().map(deployment_row).collect();
            print_table(&rows, "No deployments found");
            println!();

            println!("{}", "Pods".bold());
            print_table(&pod_rows(&snapshot), "No pods found");
            if snapshot.metrics.is_none() {
                println!("{}", "Utilization unavailable: metrics API did not answer".dimmed());
            }
        }
    }

    Ok(())
}

/// Run one of the deployment actions (`off`, `on`, `restart`)
pub async fn run_action(
    client: &ApiClient,
    name: &str,
    action: &str,
    format: OutputFormat,
) -> Result<()> {
    let deployment: Deployment = client.post(&["v1", "deployments", name, action]).await?;

    match format {
        OutputFormat::Json => print_json(&deployment)?,
        OutputFormat::Table => {
            let message = match action {
                "off" => format!(
                    "Stopped {} (was {} replicas)",
                    name.cyan(),
                    deployment.original_replicas().unwrap_or("?")
                ),
                "on" => format!(
                    "Started {} with {} replicas",
                    name.cyan(),
                    deployment.spec.replicas.unwrap_or(1)
                ),
                _ => format!("Rolling restart of {} triggered", name.cyan()),
            };
            print_success(&message);
        }
    }

    Ok(())
}

/// Delete every pod of a deployment at once
pub async fn hard_restart(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let restart: HardRestart = client.post(&["v1", "deployments", name, "hard-restart"]).await?;

    match format {
        OutputFormat::Json => print_json(&restart)?,
        OutputFormat::Table => {
            print_success(&format!("Hard restart of {}", name.cyan()));
            print_deletions(&restart.deletions);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment(value: serde_json::Value) -> Deployment {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deployment_state() {
        let stopped = deployment(json!({
            "metadata": {"name": "web", "annotations": {"kubeonoff/original-replicas": "3"}},
            "spec": {"replicas": 0}
        }));
        assert_eq!(deployment_state(&stopped), "Stopped");
        assert_eq!(deployment_row(&stopped).replicas, "0 (was 3)");

        let zero = deployment(json!({"metadata": {"name": "batch"}, "spec": {"replicas": 0}}));
        assert_eq!(deployment_state(&zero), "Scaled to zero");

        let ready = deployment(json!({
            "metadata": {"name": "api"},
            "spec": {"replicas": 2},
            "status": {"readyReplicas": 2}
        }));
        assert_eq!(deployment_state(&ready), "Ready");

        let scaling = deployment(json!({
            "metadata": {"name": "api"},
            "spec": {"replicas": 2},
            "status": {"readyReplicas": 1}
        }));
        assert_eq!(deployment_state(&scaling), "Scaling");
    }

    #[test]
    fn test_pod_rows_one_per_container() {
        colored::control::set_override(false);
        let snapshot: Snapshot = serde_json::from_value(json!({
            "deployments": {"items": [{"metadata": {"name": "web", "uid": "W1"}}]},
            "pods": {"items": [
                {"metadata": {"name": "web-1", "ownerReferences": [
                    {"kind": "ReplicaSet", "name": "rs", "uid": "RS1"}
                 ]},
                 "status": {"phase": "Running"}},
                {"metadata": {"name": "job-1"}, "status": {"phase": "Pending"}}
            ]},
            "replicaset_deployment_map": {"RS1": "W1"},
            "metrics": {"web-1": {
                "app": {"cpu_ratio": 0.5, "mem_ratio": 0.25},
                "sidecar": {"cpu_ratio": 0.1}
            }}
        }))
        .unwrap();

        let rows = pod_rows(&snapshot);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].deployment, "web");
        assert_eq!(rows[0].container, "app");
        assert_eq!(rows[0].cpu, "50%");
        assert_eq!(rows[1].memory, "-");
        assert_eq!(rows[2].name, "job-1");
        assert_eq!(rows[2].deployment, "-");
        assert_eq!(rows[2].container, "-");
    }
}
