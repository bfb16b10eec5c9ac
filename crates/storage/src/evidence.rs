//! Evidence sink backed by the snapshot store and alert log

use crate::{AlertRecord, Repository, SnapshotStore};
use alerting::{AlertEvent, EvidenceSink, SinkError};
use std::sync::Arc;
use tracing::warn;

/// Saves a snapshot, then logs the alert
///
/// A failed snapshot still produces a log record (without a path) so the
/// alert history stays complete.
pub struct EvidenceStore {
    snapshots: SnapshotStore,
    repository: Arc<Repository>,
}

impl EvidenceStore {
    pub fn new(snapshots: SnapshotStore, repository: Arc<Repository>) -> Self {
        Self {
            snapshots,
            repository,
        }
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }
}

impl EvidenceSink for EvidenceStore {
    fn capture(&self, event: &AlertEvent) -> Result<(), SinkError> {
        let (path, snapshot_error) = match self.snapshots.save(event) {
            Ok(path) => (path, None),
            Err(e) => (None, Some(e)),
        };

        self.repository
            .insert_alert(AlertRecord::from_event(event, path))
            .map_err(|e| SinkError::Snapshot(e.to_string()))?;

        match snapshot_error {
            Some(e) => {
                warn!("Snapshot for {} alert {} not saved", event.category, event.id);
                Err(SinkError::Snapshot(e.to_string()))
            }
            None => Ok(()),
        }
    }
}
