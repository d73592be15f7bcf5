//! API client for the kubeonoff service

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Append `segments` to the base URL, each percent-encoded as one segment.
    ///
    /// Names never contribute a `/` of their own, and dot segments are refused.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            anyhow::bail!("Invalid name {:?}", bad);
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL {} cannot take a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and fail on any non-2xx answer, keeping the body as the message
    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body.trim());
        }

        Ok(response)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T> {
        let response = Self::send(self.client.get(self.url(path)?)).await?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn get_text(&self, path: &[&str], query: &[(&str, String)]) -> Result<String> {
        let response = Self::send(self.client.get(self.url(path)?).query(query)).await?;
        response.text().await.context("Failed to read response")
    }

    /// POST without a body; lifecycle actions take everything from the path
    pub async fn post<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T> {
        let response = Self::send(self.client.post(self.url(path)?)).await?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T> {
        let response = Self::send(self.client.delete(self.url(path)?)).await?;
        response.json().await.context("Failed to parse response")
    }
}

// API response types. Only the fields the CLI shows are decoded.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(
        default,
        rename = "ownerReferences",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub owner_references: Vec<OwnerReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemList<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

impl<T> Default for ItemList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentStatus {
    #[serde(
        default,
        rename = "readyReplicas",
        skip_serializing_if = "Option::is_none"
    )]
    pub ready_replicas: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

impl Deployment {
    /// Replica count saved by `off`, if the deployment is currently stopped by it
    pub fn original_replicas(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get("kubeonoff/original-replicas")
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_ratio: Option<f64>,
}

/// Answer of `GET /v1/all`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub deployments: ItemList<Deployment>,
    #[serde(default)]
    pub pods: ItemList<Pod>,
    #[serde(default)]
    pub replicaset_deployment_map: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: Option<BTreeMap<String, BTreeMap<String, ContainerMetric>>>,
}

impl Snapshot {
    /// Name of the deployment a pod belongs to, through its replica set
    pub fn deployment_of(&self, pod: &Pod) -> Option<&str> {
        let deployment_uid = pod
            .metadata
            .owner_references
            .iter()
            .filter(|owner| owner.kind == "ReplicaSet")
            .find_map(|owner| self.replicaset_deployment_map.get(&owner.uid))?;

        self.deployments
            .items
            .iter()
            .find(|d| d.metadata.uid.as_deref() == Some(deployment_uid.as_str()))
            .map(|d| d.metadata.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeletionOutcome {
    Success {
        #[serde(default)]
        result: serde_json::Value,
    },
    Failure {
        status: u16,
        body: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodDeletion {
    pub pod_name: String,
    pub outcome: DeletionOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardRestart {
    pub deployment: Deployment,
    pub deletions: Vec<PodDeletion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub name: String,
}
