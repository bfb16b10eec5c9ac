//! Health and metrics endpoints

use alerting::DispatchStats;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::SharedState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    pub alert_count: usize,
    pub dispatch: DispatchStats,
}

/// Health check handler
pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let state = state.read().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_sessions: state.registry.len(),
        alert_count: state.repository.alert_count(),
        dispatch: state.monitor.dispatcher().stats(),
    })
}

/// Prometheus text exposition
pub async fn metrics_handler(State(state): State<SharedState>) -> Response {
    match &state.read().await.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
