//! reqwest-based Kubernetes API client

use super::{KubeApi, MERGE_PATCH_CONTENT_TYPE};
use crate::error::{OnOffError, Result};
use crate::observability::OnOffMetrics;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder};
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Connection settings for the Kubernetes API
#[derive(Debug, Clone)]
pub struct KubeApiConfig {
    /// API server URL
    pub base_url: String,
    /// Service account token sent as a bearer token, if present
    pub token_path: Option<PathBuf>,
    /// CA bundle used to verify the API server
    pub ca_path: Option<PathBuf>,
    /// Per-request timeout enforced by the HTTP client
    pub request_timeout: Duration,
}

impl KubeApiConfig {
    /// Settings for a pod running inside the cluster
    pub fn in_cluster() -> Self {
        Self {
            base_url: "https://kubernetes.default".to_string(),
            token_path: Some(PathBuf::from(
                "/var/run/secrets/kubernetes.io/serviceaccount/token",
            )),
            ca_path: Some(PathBuf::from(
                "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt",
            )),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Kubernetes API client
pub struct HttpKubeApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
    metrics: OnOffMetrics,
}

impl HttpKubeApi {
    /// Create a client, reading the token and CA bundle from disk
    pub fn new(config: &KubeApiConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder().timeout(config.request_timeout);

        if let Some(ca_path) = &config.ca_path {
            let pem = std::fs::read(ca_path)
                .with_context(|| format!("Failed to read CA bundle {}", ca_path.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem).context("Invalid CA bundle")?;
            builder = builder.add_root_certificate(cert);
        }

        let token = match &config.token_path {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read token {}", path.display()))?
                    .trim()
                    .to_string(),
            ),
            None => None,
        };

        let client = builder.build().context("Failed to create HTTP client")?;
        let base_url = Url::parse(&config.base_url).context("Invalid Kubernetes API URL")?;

        Ok(Self {
            client,
            base_url,
            token,
            metrics: OnOffMetrics::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the API server URL.
    ///
    /// `Url::join` normalizes dot segments and escapes, so a path that does
    /// not come out unchanged would address a different object than the one
    /// asked for, possibly in another namespace.
    fn url_for(&self, path: &str) -> Result<Url> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| OnOffError::InvalidPath(path.to_string()))?;
        if !path.starts_with('/') || url.path() != path || url.query().is_some() {
            return Err(OnOffError::InvalidPath(path.to_string()));
        }
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder> {
        let url = self.url_for(path)?;

        let request = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Send a request and return the body of a 2xx answer
    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let started = Instant::now();
        let response = request.send().await;
        self.metrics
            .observe_upstream_latency(started.elapsed().as_secs_f64());

        let response = response.map_err(|e| {
            self.metrics.inc_upstream_error(0);
            OnOffError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OnOffError::Transport(e.to_string()))?;

        if !status.is_success() {
            self.metrics.inc_upstream_error(status.as_u16());
            debug!(status = status.as_u16(), "Kubernetes API returned an error");
            return Err(OnOffError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl KubeApi for HttpKubeApi {
    async fn get_json(&self, path: &str) -> Result<Value> {
        let body = self.send(self.request(reqwest::Method::GET, path)?).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let request = self.request(reqwest::Method::GET, path)?.query(query);
        self.send(request).await
    }

    async fn merge_patch(&self, path: &str, patch: &Value) -> Result<Value> {
        let request = self
            .request(reqwest::Method::PATCH, path)?
            .header(CONTENT_TYPE, MERGE_PATCH_CONTENT_TYPE)
            .body(serde_json::to_vec(patch)?);
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        let body = self.send(self.request(reqwest::Method::DELETE, path)?).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
