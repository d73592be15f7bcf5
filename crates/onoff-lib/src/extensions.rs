//! Optional extensions mounted next to the built-in API
//!
//! An extension is built once at startup by a named factory and contributes
//! a router mounted under `/v1/kubeonoff/extensions/<name>/` plus a
//! `controls` document the UI uses to render its buttons. Which extensions
//! run is decided by configuration; factories are registered in code by
//! whoever assembles the binary.

use crate::aggregator::Aggregator;
use crate::error::{OnOffError, Result};
use crate::upstream::KubeApi;
use axum::Router;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// What a factory gets to build its extension
#[derive(Clone)]
pub struct ExtensionContext {
    pub api: Arc<dyn KubeApi>,
    pub aggregator: Arc<Aggregator>,
}

pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    /// Description of the controls offered by this extension
    fn controls(&self) -> serde_json::Value;

    /// Routes served under the extension's prefix
    fn router(&self) -> Router;
}

pub type ExtensionFactory = fn(&ExtensionContext) -> Arc<dyn Extension>;

/// Factories known to this binary, by name
#[derive(Default, Clone)]
pub struct ExtensionFactories {
    factories: BTreeMap<String, ExtensionFactory>,
}

impl ExtensionFactories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, factory: ExtensionFactory) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the extensions named in `enabled`, in order.
    ///
    /// Fails on the first name without a registered factory.
    pub fn build(
        &self,
        enabled: &[String],
        context: &ExtensionContext,
    ) -> Result<ExtensionRegistry> {
        let mut loaded = Vec::with_capacity(enabled.len());
        for name in enabled {
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| OnOffError::UnknownExtension(name.clone()))?;
            info!(extension = %name, "Loading extension");
            loaded.push(factory(context));
        }
        Ok(ExtensionRegistry { loaded })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionInfo {
    pub name: String,
}

/// Extensions loaded at startup
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    loaded: Vec<Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn list(&self) -> Vec<ExtensionInfo> {
        self.loaded
            .iter()
            .map(|ext| ExtensionInfo {
                name: ext.name().to_string(),
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Extension>> {
        self.loaded
            .iter()
            .find(|ext| ext.name() == name)
            .cloned()
            .ok_or_else(|| OnOffError::UnknownExtension(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Extension>> {
        self.loaded.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}
