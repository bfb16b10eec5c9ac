//! Evidence and sound collaborators

use crate::{AlertCategory, AlertEvent};
use thiserror::Error;

/// Failures reported by side-effect collaborators
///
/// These never reach the frame path; the dispatcher logs them and moves on.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    #[error("Sound playback failed: {0}")]
    Sound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Persists alert evidence (snapshot image, alert record)
///
/// Called from the blocking pool, possibly for several subjects at once.
pub trait EvidenceSink: Send + Sync {
    fn capture(&self, event: &AlertEvent) -> Result<(), SinkError>;
}

/// Plays the audible cue for an alert category
///
/// Calls are serialized by the dispatcher's audio worker.
pub trait AlertSound: Send + Sync {
    fn play(&self, category: AlertCategory) -> Result<(), SinkError>;
}
