//! Rice Leaf Disease Detection API Server
//!
//! HTTP front-end for the leaf classifier: health and info endpoints, image
//! upload prediction, and Prometheus metrics.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use image_pipeline::Preprocessor;
use inference_engine::{InferenceEngine, ModelFormat, ModelHandle};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod service;

pub use config::{LogFormat, ServiceConfig};
pub use error::ApiError;
pub use rate_limit::{create_governor_config, RateLimitConfig};
pub use service::{PipelineStage, PredictionError, PredictionReport, PredictionService};

/// Service identifier reported by `/health`
pub const SERVICE_NAME: &str = "rice-disease-detection";

/// `MODEL_PATH` value selecting the built-in stub model
pub const STUB_MODEL: &str = "stub";

/// Room for multipart boundaries and part headers on top of the upload cap
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const PREDICTION_SECONDS_BUCKETS: [f64; 9] = [0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Application state shared across handlers
pub struct AppState {
    /// Prediction pipeline
    pub service: Arc<PredictionService>,
    /// Effective configuration
    pub config: Arc<ServiceConfig>,
    /// Prometheus handle, when the exporter is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
}

impl AppState {
    /// Create new application state
    pub fn new(service: PredictionService, config: ServiceConfig) -> Self {
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Attach the Prometheus handle rendered by `/metrics`
    pub fn with_metrics(mut self, metrics: Option<PrometheusHandle>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Model format of the loaded model, or the one implied by the configured path
    pub fn model_format(&self) -> &'static str {
        match self.service.engine().handle() {
            Some(handle) => handle.format().as_str(),
            None => ModelFormat::from_path(&self.config.model_path)
                .map(|f| f.as_str())
                .unwrap_or("unknown"),
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.service.max_upload_bytes() + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(routes::info::index))
        .route("/health", get(routes::info::health))
        .route(
            "/predict",
            post(routes::predict::predict).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/metrics", get(routes::metrics::render))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize logging. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

/// Outcome of the startup model load
#[derive(Debug, Clone, PartialEq)]
pub enum StartupStatus {
    /// Model loaded and ready to serve
    Ready {
        format: ModelFormat,
        load_time: Duration,
    },
    /// No model; `/predict` answers `Model not loaded`
    Degraded { reason: String },
}

impl StartupStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, StartupStatus::Ready { .. })
    }
}

/// Load the configured model. Failure leaves the engine unloaded instead of
/// aborting startup.
pub fn load_engine(config: &ServiceConfig) -> (InferenceEngine, StartupStatus) {
    if config.model_path == Path::new(STUB_MODEL) {
        warn!("MODEL_PATH=stub, serving predictions from the stub model");
        let status = StartupStatus::Ready {
            format: ModelFormat::Stub,
            load_time: Duration::ZERO,
        };
        return (InferenceEngine::stub(), status);
    }

    let input_shape = Preprocessor::new(config.preprocessing).output_shape();
    match ModelHandle::load(&config.model_path, input_shape) {
        Ok(handle) => {
            let status = StartupStatus::Ready {
                format: handle.format(),
                load_time: handle.load_time(),
            };
            (InferenceEngine::new(handle), status)
        }
        Err(e) => {
            error!("Failed to load model: {}", e);
            (
                InferenceEngine::unloaded(),
                StartupStatus::Degraded {
                    reason: e.to_string(),
                },
            )
        }
    }
}

/// Load the model and assemble the shared state
pub fn bootstrap(config: ServiceConfig) -> (AppState, StartupStatus) {
    let (engine, status) = load_engine(&config);
    let service = PredictionService::from_config(&config, engine);
    (AppState::new(service, config), status)
}

/// Prometheus exporter with fixed buckets for the prediction latency histogram
fn metrics_builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("leafscan_prediction_seconds".to_string()),
        &PREDICTION_SECONDS_BUCKETS,
    )
}

/// Install the global recorder. Histogram upkeep happens on `render()`.
fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    Ok(metrics_builder()?.install_recorder()?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Run the server
pub async fn run_server(config: ServiceConfig) -> anyhow::Result<()> {
    let startup_config = config.clone();
    let (state, status) = tokio::task::spawn_blocking(move || bootstrap(startup_config)).await?;

    match &status {
        StartupStatus::Ready { format, load_time } => info!(
            "{} model ready in {:.2}s, API ready",
            format,
            load_time.as_secs_f64()
        ),
        StartupStatus::Degraded { reason } => {
            error!("CRITICAL: failed to load model on startup: {}", reason);
            error!(
                "Make sure {} exists and is a valid TFLite or ONNX model",
                config.model_path.display()
            );
        }
    }

    let metrics = if config.metrics_enabled {
        Some(install_metrics()?)
    } else {
        None
    };

    let mut app = create_router(Arc::new(state.with_metrics(metrics)));

    if let Some(limits) = RateLimitConfig::from_service(&config) {
        let governor = create_governor_config(&limits)
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit settings: {:?}", limits))?;
        info!(
            "Rate limiting enabled: burst {}, one request per {}s",
            limits.burst_size, limits.replenish_secs
        );
        app = app.layer(GovernorLayer { config: governor });
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!("Starting API server on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}
