//! Drowsiness Monitor API Server
//!
//! WebSocket streaming pipeline per connection, a request/response
//! detection endpoint, alert history, and Prometheus metrics.

use axum::{
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod config;
mod error;
mod logging;
pub mod protocol;
pub mod rate_limit;
mod routes;

pub use crate::config::Settings;
pub use error::{ApiError, ErrorReply};
pub use logging::init_logging;

use alerting::{AlertDispatcher, AlertSound, CommandSound, LogSound};
use dms::{FrameResult, LandmarkExtractor, Monitor, SessionRegistry};
use storage::{EvidenceStore, Repository, SnapshotStore};

use crate::config::ServerSettings;

/// Application state shared across handlers
pub struct AppState {
    pub monitor: Arc<Monitor>,
    /// Sessions for the request/response endpoint
    pub registry: SessionRegistry,
    pub repository: Arc<Repository>,
    /// Every result, for `/ws/live` observers
    pub live: broadcast::Sender<FrameResult>,
    /// Decodes binary frames into landmarks when configured
    pub extractor: Option<Arc<dyn LandmarkExtractor>>,
    pub server: ServerSettings,
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build the monitor and its collaborators
    ///
    /// Must run inside a tokio runtime (the alert dispatcher spawns its
    /// audio worker).
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        let repository = Arc::new(Repository::with_retention(settings.alerts.retention));
        let snapshots = SnapshotStore::new(&settings.alerts.snapshot_dir)
            .with_quality(settings.alerts.jpeg_quality);
        let evidence = Arc::new(EvidenceStore::new(snapshots, Arc::clone(&repository)));

        let sound: Arc<dyn AlertSound> = match settings
            .alerts
            .sound_command
            .as_deref()
            .and_then(CommandSound::from_argv)
        {
            Some(command) => {
                info!("Alert sound via {}", command.program());
                Arc::new(command)
            }
            None => Arc::new(LogSound),
        };

        let dispatcher = AlertDispatcher::spawn(settings.alerts.alert_config(), evidence, sound);
        let monitor = Monitor::new(settings.detection.clone(), Arc::new(dispatcher))?;
        let (live, _) = broadcast::channel(settings.server.live_buffer.max(1));

        Ok(Self {
            registry: monitor.registry(),
            monitor: Arc::new(monitor),
            repository,
            live,
            extractor: None,
            server: settings.server.clone(),
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn LandmarkExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub type SharedState = Arc<RwLock<AppState>>;

/// Create the application router
pub fn create_router(state: SharedState, server: &ServerSettings) -> Result<Router, ApiError> {
    let governor = rate_limit::create_governor_config(&server.rate_limit)?;

    Ok(Router::new()
        .route("/ws", get(routes::stream::ws_handler))
        .route("/ws/live", get(routes::live::live_handler))
        .route(
            "/api/v1/detect",
            post(routes::detect::detect).layer(GovernorLayer { config: governor }),
        )
        .route("/api/v1/sessions", get(routes::sessions::list_sessions))
        .route("/api/v1/sessions/:id", delete(routes::sessions::reset_session))
        .route("/api/v1/alerts", get(routes::alerts::get_alerts))
        .route(
            "/api/v1/alerts/:subject/:category/ack",
            post(routes::alerts::acknowledge),
        )
        .route("/api/v1/health", get(routes::health::health_handler))
        .route("/metrics", get(routes::health::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state))
}

/// Run the server until Ctrl-C
pub async fn run_server(settings: Settings) -> Result<(), ApiError> {
    let mut state = AppState::new(&settings)?;
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!("Prometheus recorder not installed: {}", e),
    }

    let state = Arc::new(RwLock::new(state));
    tokio::spawn(routes::sessions::sweep_idle_sessions(
        Arc::downgrade(&state),
        settings.server.session_idle_timeout() / 2,
    ));
    let app = create_router(state, &settings.server)?;

    let addr = settings.server.addr();
    info!("Starting drowsiness monitor on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
