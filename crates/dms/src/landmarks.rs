//! Facial landmark types and the extractor capability

use alerting::FrameRef;
use serde::{Deserialize, Serialize};

use crate::DmsError;

/// 2-D landmark position in pixel space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Landmarks for a single face, index-addressable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    /// Landmarks already in pixel coordinates
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// De-normalize `0..1` coordinates against the frame size
    pub fn from_normalized(points: &[[f32; 2]], width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            points: points.iter().map(|[x, y]| Point::new(x * w, y * h)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Gather a fixed contour; `None` if any index is out of range
    pub fn select<const N: usize>(&self, indices: &[usize; N]) -> Option<[Point; N]> {
        let mut out = [Point::default(); N];
        for (slot, &index) in out.iter_mut().zip(indices) {
            *slot = self.get(index)?;
        }
        Some(out)
    }
}

/// Anatomical index mapping supplied by the landmark extractor
///
/// Eye contours follow the canonical 6-point order (0/3 horizontal corners,
/// 1-5 and 2-4 vertical lid pairs). The mouth contour is 8 points with 0/4
/// as corners and 1-7, 2-6, 3-5 as upper/lower lip pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkLayout {
    pub left_eye: [usize; 6],
    pub right_eye: [usize; 6],
    pub mouth: [usize; 8],
    /// Outer eye corners used for the yaw proxy
    pub left_eye_corner: usize,
    pub right_eye_corner: usize,
}

impl LandmarkLayout {
    /// 468/478-point face mesh indices
    pub fn face_mesh() -> Self {
        Self {
            left_eye: [362, 385, 387, 263, 373, 380],
            right_eye: [33, 160, 158, 133, 153, 144],
            mouth: [61, 39, 0, 269, 291, 405, 17, 181],
            left_eye_corner: 33,
            right_eye_corner: 263,
        }
    }

    /// Highest index the layout reads
    pub fn max_index(&self) -> usize {
        self.left_eye
            .iter()
            .chain(&self.right_eye)
            .chain(&self.mouth)
            .chain([&self.left_eye_corner, &self.right_eye_corner])
            .copied()
            .max()
            .unwrap_or(0)
    }
}

impl Default for LandmarkLayout {
    fn default() -> Self {
        Self::face_mesh()
    }
}

/// Output of a landmark extractor for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// `None` when no face was found
    pub landmarks: Option<LandmarkSet>,
    pub width: u32,
    pub height: u32,
}

/// External facial-landmark detector
///
/// Implementations decode the frame and run inference; the pipeline only
/// consumes the resulting landmark set.
pub trait LandmarkExtractor: Send + Sync {
    fn extract(&self, frame: &FrameRef) -> Result<Extraction, DmsError>;
}
