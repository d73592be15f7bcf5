//! In-memory [`KubeApi`] for tests
//!
//! Objects are stored by API path. PATCH merges the patch into the stored
//! object, DELETE removes it, and any path can be made to fail with a given
//! status and body. Every call is recorded.

use crate::error::{OnOffError, Result};
use crate::upstream::KubeApi;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
struct FakeState {
    objects: HashMap<String, Value>,
    texts: HashMap<String, String>,
    /// keyed by (method, path); method `*` matches every method
    errors: HashMap<(String, String), (u16, String)>,
    requests: Vec<RecordedRequest>,
}

#[derive(Default)]
pub struct FakeKubeApi {
    state: Mutex<FakeState>,
}

impl FakeKubeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_json(&self, path: &str, value: Value) {
        self.lock().objects.insert(path.to_string(), value);
    }

    pub fn set_text(&self, path: &str, text: &str) {
        self.lock().texts.insert(path.to_string(), text.to_string());
    }

    /// Fail every request to `path`
    pub fn set_error(&self, path: &str, status: u16, body: &str) {
        self.set_error_for("*", path, status, body);
    }

    /// Fail requests to `path` made with `method`
    pub fn set_error_for(&self, method: &str, path: &str, status: u16, body: &str) {
        self.lock().errors.insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
    }

    pub fn object(&self, path: &str) -> Option<Value> {
        self.lock().objects.get(path).cloned()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self, method: &str, path: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(
        &self,
        method: &'static str,
        path: &str,
        body: Option<Value>,
    ) -> Result<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method,
            path: path.to_string(),
            body,
        });
        let error = state
            .errors
            .get(&(method.to_string(), path.to_string()))
            .or_else(|| state.errors.get(&("*".to_string(), path.to_string())))
            .cloned();
        match error {
            Some((status, body)) => Err(OnOffError::Upstream { status, body }),
            None => Ok(state),
        }
    }
}

fn not_found(path: &str) -> OnOffError {
    OnOffError::Upstream {
        status: 404,
        body: format!("{path} not found"),
    }
}

/// JSON merge: objects merge recursively, `null` removes, anything else replaces
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[async_trait]
impl KubeApi for FakeKubeApi {
    async fn get_json(&self, path: &str) -> Result<Value> {
        let state = self.begin("GET", path, None)?;
        state.objects.get(path).cloned().ok_or_else(|| not_found(path))
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let query: serde_json::Map<String, Value> = query
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect();
        let state = self.begin("GET", path, Some(Value::Object(query)))?;
        state.texts.get(path).cloned().ok_or_else(|| not_found(path))
    }

    async fn merge_patch(&self, path: &str, patch: &Value) -> Result<Value> {
        let mut state = self.begin("PATCH", path, Some(patch.clone()))?;
        let object = state.objects.get_mut(path).ok_or_else(|| not_found(path))?;
        merge(object, patch);
        Ok(object.clone())
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        let mut state = self.begin("DELETE", path, None)?;
        let name = path.rsplit('/').next().unwrap_or_default();
        Ok(state
            .objects
            .remove(path)
            .unwrap_or_else(|| json!({"kind": "Pod", "metadata": {"name": name}})))
    }
}
