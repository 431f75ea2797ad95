//! Credit Risk Scoring API Server
//!
//! Accepts tabular uploads of loan applicants and returns a risk tier per row.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub mod config;
pub mod context;
pub mod error;
pub mod rate_limit;
mod routes;
pub mod telemetry;

pub use crate::config::ServiceConfig;
pub use crate::context::{ScoringContext, ScoringResponse};
pub use crate::error::ApiError;
pub use crate::telemetry::init_logging;

/// State handle passed to every handler
pub type SharedState = Arc<RwLock<AppState>>;

/// Application state shared across handlers
pub struct AppState {
    /// Loaded model; `None` until artifacts load successfully
    pub context: Option<Arc<ScoringContext>>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Prometheus handle when the recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create state with no model loaded
    pub fn new() -> Self {
        Self {
            context: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics: None,
        }
    }

    pub fn with_context(mut self, context: ScoringContext) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Replace the loaded model; requests already running keep the old one
    pub fn swap_context(&mut self, context: ScoringContext) -> Option<Arc<ScoringContext>> {
        self.context.replace(Arc::new(context))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub model_loaded: bool,
    pub model: Option<ModelHealth>,
}

/// Loaded model details reported by the health check
#[derive(Debug, Serialize)]
pub struct ModelHealth {
    pub format: &'static str,
    pub feature_count: usize,
    pub class_count: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Create the application router
pub fn create_router(state: SharedState, config: &ServiceConfig) -> Router {
    let mut scoring = Router::new()
        .route("/api/v1/process-file", post(routes::scoring::process_file))
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes));

    if let Some(governor) = rate_limit::create_governor_config(&config.rate_limit) {
        info!(
            "Rate limiting scoring route: burst {}, one request per {}s",
            config.rate_limit.burst_size, config.rate_limit.per_second
        );
        scoring = scoring.layer(GovernorLayer { config: governor });
    }

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/model", get(routes::model::get_model))
        .route("/metrics", get(metrics_handler))
        .merge(scoring)
        .layer(cors_layer(&config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

/// Health check handler; 503 until a model is loaded
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.read().await;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let model = state.context.as_ref().map(|context| ModelHealth {
        format: context.model_format().as_str(),
        feature_count: context.schema().feature_count(),
        class_count: context.schema().class_labels().len(),
        loaded_at: context.loaded_at(),
    });

    let (status_code, status) = if model.is_some() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    let response = HealthResponse {
        status,
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        model_loaded: model.is_some(),
        model,
    };

    (status_code, Json(response))
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    match &state.read().await.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Run the server
pub async fn run_server(config: ServiceConfig) -> anyhow::Result<()> {
    let mut state = AppState::new();
    if let Some(handle) = telemetry::install_recorder() {
        state = state.with_metrics(handle);
    }

    match ScoringContext::load(&config.artifacts, config.enrichment.clone(), config.reader_config()) {
        Ok(context) => state = state.with_context(context),
        Err(e) => error!("Model artifacts failed to load, scoring disabled: {}", e),
    }

    let app = create_router(Arc::new(RwLock::new(state)), &config);

    info!("Starting API server on {}", config.server.bind_address);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .map_err(|e| anyhow::anyhow!("cannot bind {}: {}", config.server.bind_address, e))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
