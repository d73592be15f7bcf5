//! kubeonoff control service
//!
//! Wires the core library into an HTTP service. The binary in `main.rs`
//! only parses arguments and calls [`run`]; other binaries can call it with
//! their own extension factories.

pub mod api;
pub mod config;

use anyhow::{Context, Result};
use onoff_lib::{
    extensions::{ExtensionContext, ExtensionFactories},
    health::components,
    Aggregator, ApiPaths, HealthRegistry, HttpKubeApi, KubeApi, Lifecycle, StructuredLogger,
};
use std::sync::Arc;
use tracing::{debug, info};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the application state from configuration and a Kubernetes API client
pub async fn build_state(
    config: &config::ServiceConfig,
    api: Arc<dyn KubeApi>,
    factories: &ExtensionFactories,
) -> Result<Arc<api::AppState>> {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::UPSTREAM).await;
    health_registry.register(components::METRICS_API).await;

    let aggregator = Arc::new(Aggregator::new(
        api.clone(),
        ApiPaths::new(&config.namespace),
        health_registry.clone(),
        config.aggregator(),
    ));
    let lifecycle = Arc::new(Lifecycle::new(
        api.clone(),
        aggregator.clone(),
        &config.self_marker,
    ));

    let context = ExtensionContext {
        api,
        aggregator: aggregator.clone(),
    };
    let extensions = factories
        .build(&config.extension_names(), &context)
        .context("Failed to load extensions")?;

    Ok(Arc::new(api::AppState {
        aggregator,
        lifecycle,
        extensions,
        health_registry,
        logger: StructuredLogger::new(&config.namespace),
        auth_user_header: config.auth_user_header.clone(),
    }))
}

/// Run the service until interrupted
pub async fn run(config: config::ServiceConfig, factories: ExtensionFactories) -> Result<()> {
    info!(namespace = %config.namespace, "Service configured");

    let api: Arc<dyn KubeApi> = Arc::new(HttpKubeApi::new(&config.kube_api())?);
    let state = build_state(&config, api, &factories).await?;

    let extension_names: Vec<String> =
        state.extensions.list().into_iter().map(|e| e.name).collect();
    state.logger.log_startup(VERSION, &extension_names);

    // Release cache keys nobody uses any more
    let aggregator = state.aggregator.clone();
    let sweep_interval = config.cache_sweep_interval();
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let released = aggregator.sweep_caches();
            debug!(released, "Swept resource caches");
        }
    });

    state.health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, state.clone()));

    tokio::select! {
        result = api_handle => {
            sweeper.abort();
            result.context("API server task panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            state.logger.log_shutdown("SIGINT received");
            sweeper.abort();
        }
    }

    info!("Shutting down");
    Ok(())
}
