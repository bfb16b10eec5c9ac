//! Alerting System
//!
//! Alert episode types, evidence/sound capability traits, and the
//! fire-and-forget dispatcher that drives them.

mod dispatcher;
mod manager;
mod sink;
mod sound;

pub use dispatcher::{AlertDispatcher, DispatchStats};
pub use manager::{AlertConfig, AlertManager, AlertState};
pub use sink::{AlertSound, EvidenceSink, SinkError};
pub use sound::{CommandSound, LogSound};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Alert categories tracked per subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// Eyes closed for a sustained run of frames
    EyesClosed,
    /// Mouth held open (yawning)
    Yawn,
    /// Head turned away from the road
    HeadTurn,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 3] = [Self::EyesClosed, Self::Yawn, Self::HeadTurn];

    /// String representation for file names, labels, and logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EyesClosed => "eyes_closed",
            Self::Yawn => "yawn",
            Self::HeadTurn => "head_turn",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eyes_closed" => Ok(Self::EyesClosed),
            "yawn" => Ok(Self::Yawn),
            "head_turn" => Ok(Self::HeadTurn),
            other => Err(format!("unknown alert category: {other}")),
        }
    }
}

/// Opaque handle to the frame a result was computed from
///
/// Carries the encoded image bytes when the transport supplied them, so the
/// evidence sink can persist a snapshot without the core ever decoding it.
#[derive(Clone, Default)]
pub struct FrameRef {
    sequence: u64,
    image: Option<Arc<[u8]>>,
}

impl FrameRef {
    /// Frame without image data
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            image: None,
        }
    }

    /// Frame carrying encoded image bytes (JPEG, PNG, ...)
    pub fn with_image(sequence: u64, image: impl Into<Arc<[u8]>>) -> Self {
        Self {
            sequence,
            image: Some(image.into()),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }
}

impl fmt::Debug for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRef")
            .field("sequence", &self.sequence)
            .field("image_bytes", &self.image.as_ref().map(|b| b.len()))
            .finish()
    }
}

/// One alert episode, created at the onset of a sustained condition
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub category: AlertCategory,
    pub subject_id: String,
    pub triggered_at: DateTime<Utc>,
    pub frame_sequence: u64,
    /// Frame handed to the evidence sink
    #[serde(skip)]
    pub snapshot: FrameRef,
}

impl AlertEvent {
    pub fn new(category: AlertCategory, subject_id: impl Into<String>, snapshot: FrameRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            subject_id: subject_id.into(),
            triggered_at: Utc::now(),
            frame_sequence: snapshot.sequence(),
            snapshot,
        }
    }
}
