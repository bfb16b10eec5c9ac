//! Session Routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Weak;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{ApiError, AppState, SharedState};

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub data: Vec<String>,
    pub count: usize,
}

/// Subjects with a request/response session
pub async fn list_sessions(State(state): State<SharedState>) -> Json<SessionsResponse> {
    let data = state.read().await.registry.ids();
    Json(SessionsResponse {
        count: data.len(),
        data,
    })
}

/// Drop a subject's tracking state
pub async fn reset_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut state = state.write().await;
    if !state.registry.remove(&id) {
        return Err(ApiError::NotFound(format!("session {id}")));
    }
    state.monitor.dispatcher().forget_subject(&id);
    info!("Session reset: {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Drop request/response sessions that stopped sending frames
pub(crate) fn expire_idle(state: &mut AppState, now: Instant) -> Vec<String> {
    let evicted = state
        .registry
        .evict_idle(state.server.session_idle_timeout(), now);
    for id in &evicted {
        state.monitor.dispatcher().forget_subject(id);
    }
    if !evicted.is_empty() {
        info!("Expired {} idle sessions", evicted.len());
    }
    evicted
}

/// Periodically expire idle sessions until the state is dropped
pub(crate) async fn sweep_idle_sessions(state: Weak<RwLock<AppState>>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let Some(state) = state.upgrade() else {
            break;
        };
        let mut guard = state.write().await;
        expire_idle(&mut guard, Instant::now());
        debug!("Idle sweep done, {} sessions left", guard.registry.len());
    }
}
