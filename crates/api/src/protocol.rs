//! Client frame messages

use dms::{FrameInput, FrameRef, LandmarkSet, Point};
use serde::{Deserialize, Serialize};

use crate::ApiError;

/// Landmarks for one frame as sent by a client
///
/// `landmarks` is `null` (or empty) when the client's detector found no
/// face. Coordinates are `0..1` unless `normalized` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMessage {
    #[serde(default)]
    pub landmarks: Option<Vec<[f32; 2]>>,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_normalized")]
    pub normalized: bool,
}

fn default_normalized() -> bool {
    true
}

impl FrameMessage {
    pub fn parse(text: &str) -> Result<Self, ApiError> {
        let message: Self = serde_json::from_str(text)
            .map_err(|e| ApiError::BadRequest(format!("invalid frame message: {e}")))?;
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.width == 0 || self.height == 0 {
            return Err(ApiError::BadRequest(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn into_input(self, frame: FrameRef) -> FrameInput {
        let landmarks = self.landmarks.filter(|points| !points.is_empty()).map(|points| {
            if self.normalized {
                LandmarkSet::from_normalized(&points, self.width, self.height)
            } else {
                LandmarkSet::new(points.iter().map(|&[x, y]| Point::new(x, y)).collect())
            }
        });

        FrameInput {
            landmarks,
            frame_width: self.width,
            frame_height: self.height,
            frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalized_landmarks() {
        let message =
            FrameMessage::parse(r#"{"landmarks": [[0.5, 0.5], [0.25, 1.0]], "width": 640, "height": 480}"#)
                .unwrap();
        assert!(message.normalized);

        let input = message.into_input(FrameRef::new(1));
        let landmarks = input.landmarks.unwrap();
        assert_eq!(landmarks.get(0), Some(Point::new(320.0, 240.0)));
        assert_eq!(landmarks.get(1), Some(Point::new(160.0, 480.0)));
        assert_eq!(input.frame.sequence(), 1);
    }

    #[test]
    fn test_pixel_landmarks_and_no_face() {
        let message = FrameMessage::parse(
            r#"{"landmarks": [[12.0, 30.0]], "width": 640, "height": 480, "normalized": false}"#,
        )
        .unwrap();
        let input = message.into_input(FrameRef::default());
        assert_eq!(input.landmarks.unwrap().get(0), Some(Point::new(12.0, 30.0)));

        let empty = FrameMessage::parse(r#"{"landmarks": [], "width": 640, "height": 480}"#).unwrap();
        assert!(empty.into_input(FrameRef::default()).landmarks.is_none());

        let null = FrameMessage::parse(r#"{"landmarks": null, "width": 640, "height": 480}"#).unwrap();
        assert!(null.into_input(FrameRef::default()).landmarks.is_none());
    }

    #[test]
    fn test_malformed_messages_rejected() {
        assert!(matches!(
            FrameMessage::parse("not json"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(FrameMessage::parse(r#"{"landmarks": null, "width": 0, "height": 480}"#).is_err());
        assert!(FrameMessage::parse(r#"{"landmarks": [[1.0]], "width": 10, "height": 10}"#).is_err());
    }
}
