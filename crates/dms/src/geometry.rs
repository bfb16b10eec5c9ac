//! Landmark geometry: eye/mouth aspect ratios and the yaw proxy
//!
//! Everything here is pure. A metric whose reference span collapses
//! (occluded or coincident corners) comes back as `None` instead of an
//! unbounded ratio.

use serde::Serialize;

use crate::landmarks::{LandmarkLayout, LandmarkSet, Point};

/// Spans at or below this many pixels are treated as degenerate
pub const MIN_SPAN: f32 = 1e-6;

/// Yaw proxy range: +/-100 at the frame edges
pub const YAW_RANGE: f32 = 100.0;

/// Per-frame raw signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameMetrics {
    pub ear: Option<f32>,
    pub mar: Option<f32>,
    pub yaw: Option<f32>,
}

impl FrameMetrics {
    /// Compute all signals for one face
    ///
    /// EAR averages whichever eyes are measurable.
    pub fn compute(landmarks: &LandmarkSet, layout: &LandmarkLayout, frame_width: u32) -> Self {
        let left = landmarks
            .select(&layout.left_eye)
            .and_then(|eye| eye_aspect_ratio(&eye));
        let right = landmarks
            .select(&layout.right_eye)
            .and_then(|eye| eye_aspect_ratio(&eye));

        let ear = match (left, right) {
            (Some(l), Some(r)) => Some((l + r) / 2.0),
            (Some(single), None) | (None, Some(single)) => Some(single),
            (None, None) => None,
        };

        let mar = landmarks
            .select(&layout.mouth)
            .and_then(|mouth| mouth_aspect_ratio(&mouth));

        Self {
            ear,
            mar,
            yaw: estimate_yaw(landmarks, layout, frame_width),
        }
    }
}

/// `(|p1-p5| + |p2-p4|) / (2 |p0-p3|)`
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> Option<f32> {
    let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
    ratio(vertical, eye[0].distance(&eye[3]))
}

/// `(|p1-p7| + |p2-p6| + |p3-p5|) / (2 |p0-p4|)`
pub fn mouth_aspect_ratio(mouth: &[Point; 8]) -> Option<f32> {
    let vertical = mouth[1].distance(&mouth[7])
        + mouth[2].distance(&mouth[6])
        + mouth[3].distance(&mouth[5]);
    ratio(vertical, mouth[0].distance(&mouth[4]))
}

/// Horizontal head-rotation proxy
///
/// Offset of the eye-corner midpoint from the frame centre, scaled so the
/// frame edges map to +/-100. Monotonic in left/right rotation but not a
/// calibrated angle; translation of the head reads as yaw too.
pub fn estimate_yaw(landmarks: &LandmarkSet, layout: &LandmarkLayout, frame_width: u32) -> Option<f32> {
    if frame_width == 0 {
        return None;
    }
    let left = landmarks.get(layout.left_eye_corner)?;
    let right = landmarks.get(layout.right_eye_corner)?;
    if !left.is_finite() || !right.is_finite() {
        return None;
    }

    let half_width = frame_width as f32 / 2.0;
    let mid_x = (left.x + right.x) / 2.0;
    let yaw = (mid_x - half_width) / half_width * YAW_RANGE;
    Some(yaw.clamp(-YAW_RANGE, YAW_RANGE))
}

fn ratio(vertical: f32, span: f32) -> Option<f32> {
    if !span.is_finite() || !vertical.is_finite() || span <= MIN_SPAN {
        return None;
    }
    Some(vertical / (2.0 * span))
}
