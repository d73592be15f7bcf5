//! Access to the Kubernetes API
//!
//! The aggregation and lifecycle code only sees the [`KubeApi`] trait, so the
//! transport can be swapped for an in-memory fake in tests. [`HttpKubeApi`]
//! is the production implementation.

mod client;
mod paths;

pub use client::{HttpKubeApi, KubeApiConfig};
pub use paths::{validate_name, ApiPaths};

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Content type used for every PATCH issued by this crate.
pub const MERGE_PATCH_CONTENT_TYPE: &str = "application/strategic-merge-patch+json";

/// Minimal Kubernetes API surface used by the control service.
///
/// Every method fails with [`crate::OnOffError::Upstream`] when the API
/// answers with a non-2xx status, carrying the status and body untouched.
#[async_trait]
pub trait KubeApi: Send + Sync {
    /// GET a JSON document
    async fn get_json(&self, path: &str) -> Result<Value>;

    /// GET a plain-text document, such as container logs
    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String>;

    /// PATCH with a strategic merge patch and return the patched object
    async fn merge_patch(&self, path: &str, patch: &Value) -> Result<Value>;

    /// DELETE and return the API's JSON answer
    async fn delete(&self, path: &str) -> Result<Value>;
}

/// GET `path` and decode the answer into `T`.
pub async fn get_as<T: DeserializeOwned>(api: &dyn KubeApi, path: &str) -> Result<T> {
    let value = api.get_json(path).await?;
    Ok(serde_json::from_value(value)?)
}
