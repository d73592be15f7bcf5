//! Pod commands: delete, delete all, logs

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, DeletionOutcome, PodDeletion};
use crate::output::{print_json, print_success, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct DeletionRow {
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Result")]
    result: String,
}

fn deletion_row(deletion: &PodDeletion) -> DeletionRow {
    let result = match &deletion.outcome {
        DeletionOutcome::Success { .. } => "deleted".green().to_string(),
        DeletionOutcome::Failure { status, body } => {
            format!("{} ({})", body.trim(), status).red().to_string()
        }
    };
    DeletionRow {
        pod: deletion.pod_name.clone(),
        result,
    }
}

/// Table of per-pod outcomes, with a warning when some were refused
pub fn print_deletions(deletions: &[PodDeletion]) {
    let rows: Vec<DeletionRow> = deletions.iter().map(deletion_row).collect();
    print_table(&rows, "No pods to delete");

    let failed = deletions
        .iter()
        .filter(|d| matches!(d.outcome, DeletionOutcome::Failure { .. }))
        .count();
    if failed > 0 {
        print_warning(&format!("{} of {} deletions failed", failed, deletions.len()));
    }
}

pub async fn delete_pod(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let deleted: serde_json::Value = client.delete(&["v1", "pods", name]).await?;

    match format {
        OutputFormat::Json => print_json(&deleted)?,
        OutputFormat::Table => print_success(&format!("Deleted pod {}", name.cyan())),
    }

    Ok(())
}

pub async fn delete_all_pods(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let deletions: Vec<PodDeletion> = client.delete(&["v1", "pods", "all"]).await?;

    match format {
        OutputFormat::Json => print_json(&deletions)?,
        OutputFormat::Table => print_deletions(&deletions),
    }

    Ok(())
}

/// Print the tail of a container's log as is
pub async fn show_logs(
    client: &ApiClient,
    pod: &str,
    container: &str,
    timestamps: bool,
) -> Result<()> {
    let log = client
        .get_text(
            &["v1", "pods", pod, container, "log"],
            &[("timestamps", timestamps.to_string())],
        )
        .await?;
    print!("{}", log);
    Ok(())
}
