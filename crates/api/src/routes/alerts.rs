//! Alert Routes

use alerting::AlertCategory;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use storage::AlertRecord;

use crate::{ApiError, SharedState};

/// Query parameters for alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Filter by category (`eyes_closed`, `yawn`, `head_turn`)
    pub category: Option<String>,
    /// Filter by subject
    pub subject: Option<String>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Alert waiting for acknowledgement
#[derive(Debug, Serialize)]
pub struct PendingAlert {
    pub subject_id: String,
    pub category: AlertCategory,
    pub fire_count: usize,
}

/// Response for alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub data: Vec<AlertRecord>,
    pub count: usize,
    pub pending: Vec<PendingAlert>,
    pub unacknowledged_count: usize,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub acknowledged: bool,
}

fn parse_category(raw: &str) -> Result<AlertCategory, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}

/// Get alerts, most recent first
pub async fn get_alerts(
    State(state): State<SharedState>,
    Query(params): Query<AlertQuery>,
) -> Result<Json<AlertResponse>, ApiError> {
    let category = params.category.as_deref().map(parse_category).transpose()?;
    let limit = params.limit.min(1000);

    let state = state.read().await;
    let data = state
        .repository
        .get_alerts(category, params.subject.as_deref(), limit)?;

    let pending: Vec<PendingAlert> = state
        .monitor
        .dispatcher()
        .pending()
        .into_iter()
        .map(|(subject_id, category, fire_count)| PendingAlert {
            subject_id,
            category,
            fire_count,
        })
        .collect();

    Ok(Json(AlertResponse {
        count: data.len(),
        unacknowledged_count: pending.len(),
        pending,
        data,
    }))
}

/// Acknowledge the latest alert of a category for a subject
pub async fn acknowledge(
    State(state): State<SharedState>,
    Path((subject, category)): Path<(String, String)>,
) -> Result<Json<AckResponse>, ApiError> {
    let category = parse_category(&category)?;
    let state = state.read().await;
    if state.monitor.dispatcher().acknowledge(&subject, category) {
        Ok(Json(AckResponse { acknowledged: true }))
    } else {
        Err(ApiError::NotFound(format!("{category} alert for {subject}")))
    }
}
