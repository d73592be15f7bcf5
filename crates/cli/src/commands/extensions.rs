//! Extension listing

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, ExtensionInfo};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct ExtensionRow {
    #[tabled(rename = "Extension")]
    name: String,
    #[tabled(rename = "Mounted at")]
    prefix: String,
}

pub async fn list_extensions(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let extensions: Vec<ExtensionInfo> = client.get(&["v1", "kubeonoff", "extensions"]).await?;

    match format {
        OutputFormat::Json => print_json(&extensions)?,
        OutputFormat::Table => {
            let rows: Vec<ExtensionRow> = extensions
                .into_iter()
                .map(|ext| ExtensionRow {
                    prefix: format!("/v1/kubeonoff/extensions/{}/", ext.name),
                    name: ext.name,
                })
                .collect();
            print_table(&rows, "No extensions loaded");
        }
    }

    Ok(())
}
