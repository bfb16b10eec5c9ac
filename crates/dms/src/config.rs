//! DMS configuration

use crate::landmarks::LandmarkLayout;
use crate::DmsError;
use alerting::AlertCategory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Debounce settings for one alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Consecutive condition frames before the category alerts
    pub consec_frames: u32,
    /// Condition-free frames tolerated while alerting before the episode ends
    pub grace_frames: u32,
}

impl CategoryConfig {
    pub const fn new(consec_frames: u32, grace_frames: u32) -> Self {
        Self {
            consec_frames,
            grace_frames,
        }
    }
}

/// Whether alert categories share a cooldown window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// Each category measures cooldown from its own last dispatch
    #[default]
    PerCategory,
    /// Any dispatch for the subject starts the cooldown for all categories
    Shared,
}

/// DMS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Eye aspect ratio below which the eyes count as closed
    pub eye_ar_thresh: f32,

    /// Mouth aspect ratio above which the mouth counts as yawning
    pub mouth_ar_thresh: f32,

    /// Absolute smoothed yaw above which the head counts as turned
    pub turn_threshold: f32,

    /// Rolling window size (frames) for signal smoothing
    pub smoothing_window: usize,

    /// Smooth EAR as well as yaw
    pub smooth_ear: bool,

    /// Smooth MAR as well as yaw
    pub smooth_mar: bool,

    /// Per-category debounce, counted in frames rather than wall time
    pub eyes: CategoryConfig,
    /// The default 15 frames is about 0.5 s of sustained yawn at 30 fps;
    /// use 30 for a one-second minimum
    pub yawn: CategoryConfig,
    pub head_turn: CategoryConfig,

    /// Minimum interval between dispatches (seconds, 0 disables cooldown)
    pub alert_cooldown_secs: f64,

    /// Cooldown sharing between categories
    pub cooldown_scope: CooldownScope,

    /// Consecutive face-less frames before a warning is logged
    pub face_absent_warn_frames: u32,

    /// Anatomical landmark indices used by the geometry metrics
    pub landmarks: LandmarkLayout,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            eye_ar_thresh: 0.25,
            mouth_ar_thresh: 0.37,
            turn_threshold: 25.0,
            smoothing_window: 10,
            smooth_ear: false,
            smooth_mar: false,
            eyes: CategoryConfig::new(3, 1),
            yawn: CategoryConfig::new(15, 1),
            head_turn: CategoryConfig::new(20, 1),
            alert_cooldown_secs: 3.0,
            cooldown_scope: CooldownScope::PerCategory,
            face_absent_warn_frames: 30,
            landmarks: LandmarkLayout::default(),
        }
    }
}

impl DmsConfig {
    /// Debounce settings for a category
    pub fn category(&self, category: AlertCategory) -> CategoryConfig {
        match category {
            AlertCategory::EyesClosed => self.eyes,
            AlertCategory::Yawn => self.yawn,
            AlertCategory::HeadTurn => self.head_turn,
        }
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.alert_cooldown_secs).unwrap_or(Duration::ZERO)
    }

    /// Reject settings that would make the pipeline meaningless
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.smoothing_window == 0 {
            return Err(DmsError::Config("smoothing_window must be at least 1".into()));
        }
        for (name, value) in [
            ("eye_ar_thresh", self.eye_ar_thresh),
            ("mouth_ar_thresh", self.mouth_ar_thresh),
            ("turn_threshold", self.turn_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DmsError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        for category in AlertCategory::ALL {
            if self.category(category).consec_frames == 0 {
                return Err(DmsError::Config(format!(
                    "{category}.consec_frames must be at least 1"
                )));
            }
        }
        if !self.alert_cooldown_secs.is_finite() || self.alert_cooldown_secs < 0.0 {
            return Err(DmsError::Config(format!(
                "alert_cooldown_secs must be >= 0, got {}",
                self.alert_cooldown_secs
            )));
        }
        Ok(())
    }
}
