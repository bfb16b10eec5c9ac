//! Frame input and analysis result types

use alerting::{AlertCategory, AlertEvent, FrameRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::landmarks::{Extraction, LandmarkSet};

/// One frame's worth of input for a subject
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    /// `None` when no face was detected
    pub landmarks: Option<LandmarkSet>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame: FrameRef,
}

impl FrameInput {
    pub fn face(landmarks: LandmarkSet, frame_width: u32, frame_height: u32) -> Self {
        Self {
            landmarks: Some(landmarks),
            frame_width,
            frame_height,
            frame: FrameRef::default(),
        }
    }

    pub fn no_face(frame_width: u32, frame_height: u32) -> Self {
        Self {
            landmarks: None,
            frame_width,
            frame_height,
            frame: FrameRef::default(),
        }
    }

    pub fn from_extraction(extraction: Extraction, frame: FrameRef) -> Self {
        Self {
            landmarks: extraction.landmarks,
            frame_width: extraction.width,
            frame_height: extraction.height,
            frame,
        }
    }

    /// Attach the frame handle used for evidence capture
    pub fn with_frame(mut self, frame: FrameRef) -> Self {
        self.frame = frame;
        self
    }
}

/// Per-frame analysis result, as sent back to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub subject_id: String,
    pub face_detected: bool,
    pub ear: f32,
    pub mar: f32,
    pub yaw: f32,
    pub eyes_closed: bool,
    pub yawning: bool,
    pub head_turned: bool,
    pub alarm_active: bool,
    pub timestamp: DateTime<Utc>,
}

impl FrameResult {
    /// Neutral result for a frame without a face
    pub fn no_face(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            face_detected: false,
            ear: 0.0,
            mar: 0.0,
            yaw: 0.0,
            eyes_closed: false,
            yawning: false,
            head_turned: false,
            alarm_active: false,
            timestamp: Utc::now(),
        }
    }

    /// Categories currently flagged
    pub fn active_categories(&self) -> Vec<AlertCategory> {
        let mut active = Vec::new();
        if self.eyes_closed {
            active.push(AlertCategory::EyesClosed);
        }
        if self.yawning {
            active.push(AlertCategory::Yawn);
        }
        if self.head_turned {
            active.push(AlertCategory::HeadTurn);
        }
        active
    }
}

/// Result plus the episodes that should be dispatched
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub result: FrameResult,
    pub alerts: Vec<AlertEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_face_result_is_neutral() {
        let result = FrameResult::no_face("cab-7");
        assert!(!result.face_detected);
        assert!(!result.alarm_active);
        assert!(result.active_categories().is_empty());
        assert_eq!(result.ear, 0.0);
    }

    #[test]
    fn test_result_wire_format() {
        let mut result = FrameResult::no_face("cab-7");
        result.face_detected = true;
        result.yawning = true;
        result.alarm_active = true;

        let json = serde_json::to_value(&result).unwrap();
        for key in [
            "subject_id",
            "face_detected",
            "ear",
            "mar",
            "yaw",
            "eyes_closed",
            "yawning",
            "head_turned",
            "alarm_active",
            "timestamp",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(result.active_categories(), vec![AlertCategory::Yawn]);

        let back: FrameResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
