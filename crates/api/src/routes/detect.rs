//! Request/response detection

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use dms::{FrameRef, FrameResult};
use serde::{Deserialize, Serialize};

use crate::protocol::FrameMessage;
use crate::{ApiError, AppState, SharedState};

/// Subject used when a request names none
pub const DEFAULT_SUBJECT: &str = "default";

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectRequest {
    #[serde(default)]
    pub subject_id: Option<String>,
    pub frame: FrameMessage,
}

/// Analyze one frame against the subject's shared session
pub async fn detect(
    State(state): State<SharedState>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> Result<Json<FrameResult>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    request.frame.validate()?;

    let subject_id = request
        .subject_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

    let mut state = state.write().await;
    let AppState {
        monitor,
        registry,
        live,
        ..
    } = &mut *state;

    let input = request.frame.into_input(FrameRef::default());
    let result = monitor.handle_in(registry, &subject_id, input)?;
    let _ = live.send(result.clone());
    Ok(Json(result))
}
