//! HTTP API: resource snapshot, lifecycle actions, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use onoff_lib::{
    extensions::ExtensionRegistry, Aggregator, ComponentStatus, HealthRegistry, Lifecycle,
    OnOffError, StructuredLogger,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub lifecycle: Arc<Lifecycle>,
    pub extensions: ExtensionRegistry,
    pub health_registry: HealthRegistry,
    pub logger: StructuredLogger,
    /// Header the authenticating proxy puts the user name in
    pub auth_user_header: Option<String>,
}

impl AppState {
    /// User reported by the proxy, `(unknown)` without one
    pub fn request_user(&self, headers: &HeaderMap) -> String {
        self.auth_user_header
            .as_deref()
            .and_then(|header| headers.get(header))
            .and_then(|value| value.to_str().ok())
            .unwrap_or("(unknown)")
            .to_string()
    }
}

/// Error returned by handlers
pub struct ApiError(OnOffError);

impl From<OnOffError> for ApiError {
    fn from(err: OnOffError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.0 {
            // Pass the Kubernetes API answer through untouched
            OnOffError::Upstream { body, .. } => (status, body).into_response(),
            other => {
                if status.is_server_error() {
                    error!(error = %other, "Request failed");
                }
                (status, other.to_string()).into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn get_all(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let snapshot = state.aggregator.fetch_snapshot().await?;
    Ok(Json(snapshot))
}

async fn deployment_off(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.lifecycle.scale_off(&name).await?))
}

async fn deployment_on(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.lifecycle.scale_on(&name).await?))
}

async fn deployment_restart(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.lifecycle.rolling_restart(&name).await?))
}

async fn deployment_hard_restart(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.lifecycle.hard_restart(&name).await?))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    #[serde(default)]
    timestamps: bool,
}

async fn pod_log(
    State(state): State<Arc<AppState>>,
    Path((name, container)): Path<(String, String)>,
    Query(query): Query<LogQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(state
        .lifecycle
        .pod_log(&name, &container, query.timestamps)
        .await?)
}

async fn pod_delete(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.lifecycle.delete_pod(&name).await?))
}

async fn pod_delete_all(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.lifecycle.delete_all_pods().await?))
}

async fn list_extensions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.extensions.list())
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        // metrics API trouble only costs us the utilization columns
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Log every request with the user reported by the proxy
async fn audit_trail(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let user = state.request_user(request.headers());
    state
        .logger
        .log_request(&user, request.method().as_str(), request.uri().path());
    next.run(request).await
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/v1/all", get(get_all))
        .route("/v1/deployments/:name/off", post(deployment_off))
        .route("/v1/deployments/:name/on", post(deployment_on))
        .route("/v1/deployments/:name/restart", post(deployment_restart))
        .route(
            "/v1/deployments/:name/hard-restart",
            post(deployment_hard_restart),
        )
        .route("/v1/pods/:name/:container/log", get(pod_log))
        .route("/v1/pods/all", delete(pod_delete_all))
        .route("/v1/pods/:name", delete(pod_delete))
        .route("/v1/kubeonoff/extensions", get(list_extensions))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state.clone());

    for extension in state.extensions.iter() {
        let controls = extension.controls();
        let extension_router = Router::new()
            .route("/controls", get(move || async move { Json(controls) }))
            .merge(extension.router());
        router = router.nest(
            &format!("/v1/kubeonoff/extensions/{}", extension.name()),
            extension_router,
        );
    }

    router.layer(middleware::from_fn_with_state(state, audit_trail))
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
