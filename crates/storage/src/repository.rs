//! Repository Implementation

use crate::StorageError;
use alerting::{AlertCategory, AlertEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Default alert log retention
pub const DEFAULT_MAX_ALERT_RECORDS: usize = 10_000;

/// Alert log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub subject_id: String,
    pub category: AlertCategory,
    pub triggered_at: DateTime<Utc>,
    pub frame_sequence: u64,
    /// Saved snapshot, if the frame carried image data
    pub snapshot_path: Option<PathBuf>,
}

impl AlertRecord {
    pub fn from_event(event: &AlertEvent, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            id: event.id,
            subject_id: event.subject_id.clone(),
            category: event.category,
            triggered_at: event.triggered_at,
            frame_sequence: event.frame_sequence,
            snapshot_path,
        }
    }
}

/// Repository for alert records (in-memory, oldest evicted first)
pub struct Repository {
    alerts: Mutex<VecDeque<AlertRecord>>,
    max_alert_records: usize,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_MAX_ALERT_RECORDS)
    }

    pub fn with_retention(max_alert_records: usize) -> Self {
        let max_alert_records = max_alert_records.max(1);
        info!("Creating in-memory alert log (retention {})", max_alert_records);
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(max_alert_records.min(1024))),
            max_alert_records,
        }
    }

    /// Insert an alert record
    pub fn insert_alert(&self, record: AlertRecord) -> Result<(), StorageError> {
        let mut alerts = self
            .alerts
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        // Enforce retention
        while alerts.len() >= self.max_alert_records {
            alerts.pop_front();
        }

        debug!("Logged {} alert {} for {}", record.category, record.id, record.subject_id);
        alerts.push_back(record);
        Ok(())
    }

    /// Most recent alerts first, optionally filtered
    pub fn get_alerts(
        &self,
        category: Option<AlertCategory>,
        subject_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, StorageError> {
        let alerts = self
            .alerts
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        Ok(alerts
            .iter()
            .rev()
            .filter(|r| category.map_or(true, |c| r.category == c))
            .filter(|r| subject_id.map_or(true, |s| r.subject_id == s))
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}
