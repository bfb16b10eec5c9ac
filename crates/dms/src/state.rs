//! Per-subject tracking state

use alerting::AlertCategory;
use serde::Serialize;
use std::time::Instant;

use crate::config::{CooldownScope, DmsConfig};
use crate::debounce::{DebounceMachine, Transition};
use crate::geometry::FrameMetrics;
use crate::smoother::RollingMean;
use crate::DmsError;

/// Debounced per-category flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryFlags {
    pub eyes_closed: bool,
    pub yawning: bool,
    pub head_turned: bool,
}

impl CategoryFlags {
    pub fn any(&self) -> bool {
        self.eyes_closed || self.yawning || self.head_turned
    }
}

/// Result of advancing the state by one measured frame
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Signals as compared against the thresholds (smoothed where enabled)
    pub signals: FrameMetrics,
    pub transitions: Vec<(AlertCategory, Transition)>,
}

/// Subject state (tracked over time)
///
/// Owned by exactly one pipeline; nothing here is shared between subjects.
#[derive(Debug, Clone)]
pub struct SubjectState {
    yaw: RollingMean,
    ear: Option<RollingMean>,
    mar: Option<RollingMean>,
    eyes: DebounceMachine,
    yawn: DebounceMachine,
    head_turn: DebounceMachine,

    /// Consecutive frames without a face
    pub face_absent_frames: u32,

    /// Frames seen since the state was created
    pub frames_processed: u64,
}

impl SubjectState {
    pub fn new(config: &DmsConfig) -> Result<Self, DmsError> {
        let window = config.smoothing_window;
        let cooldown = config.alert_cooldown();
        let optional = |enabled: bool| -> Result<Option<RollingMean>, DmsError> {
            Ok(if enabled {
                Some(RollingMean::new(window)?)
            } else {
                None
            })
        };

        Ok(Self {
            yaw: RollingMean::new(window)?,
            ear: optional(config.smooth_ear)?,
            mar: optional(config.smooth_mar)?,
            eyes: DebounceMachine::new(config.eyes, cooldown),
            yawn: DebounceMachine::new(config.yawn, cooldown),
            head_turn: DebounceMachine::new(config.head_turn, cooldown),
            face_absent_frames: 0,
            frames_processed: 0,
        })
    }

    /// Run raw metrics through the enabled smoothers
    pub fn smooth(&mut self, raw: FrameMetrics) -> FrameMetrics {
        fn apply(window: Option<&mut RollingMean>, value: Option<f32>) -> Option<f32> {
            match (window, value) {
                (Some(window), Some(v)) => Some(window.push(v)),
                (_, value) => value,
            }
        }

        FrameMetrics {
            ear: apply(self.ear.as_mut(), raw.ear),
            mar: apply(self.mar.as_mut(), raw.mar),
            yaw: apply(Some(&mut self.yaw), raw.yaw),
        }
    }

    /// Advance by one frame with a detected face
    pub fn step(&mut self, raw: FrameMetrics, config: &DmsConfig, now: Instant) -> Step {
        self.frames_processed += 1;
        self.face_absent_frames = 0;

        let signals = self.smooth(raw);
        let conditions = [
            (
                AlertCategory::EyesClosed,
                signals.ear.map(|ear| ear < config.eye_ar_thresh),
            ),
            (
                AlertCategory::Yawn,
                signals.mar.map(|mar| mar > config.mouth_ar_thresh),
            ),
            (
                AlertCategory::HeadTurn,
                signals.yaw.map(|yaw| yaw.abs() > config.turn_threshold),
            ),
        ];

        let mut transitions = Vec::with_capacity(conditions.len());
        for (category, condition) in conditions {
            // Recomputed per category so a shared onset this frame is seen
            // by the categories after it
            let anchor = match config.cooldown_scope {
                CooldownScope::PerCategory => self.machine(category).last_dispatched(),
                CooldownScope::Shared => self.latest_dispatch(),
            };
            let transition = self.machine_mut(category).update(condition, now, anchor);
            transitions.push((category, transition));
        }

        Step {
            signals,
            transitions,
        }
    }

    /// Advance by one frame without a face: every counter restarts
    pub fn neutral(&mut self) -> Vec<(AlertCategory, Transition)> {
        self.frames_processed += 1;
        self.face_absent_frames = self.face_absent_frames.saturating_add(1);

        AlertCategory::ALL
            .into_iter()
            .map(|category| (category, self.machine_mut(category).reset()))
            .collect()
    }

    pub fn active_flags(&self) -> CategoryFlags {
        CategoryFlags {
            eyes_closed: self.eyes.is_active(),
            yawning: self.yawn.is_active(),
            head_turned: self.head_turn.is_active(),
        }
    }

    pub fn machine(&self, category: AlertCategory) -> &DebounceMachine {
        match category {
            AlertCategory::EyesClosed => &self.eyes,
            AlertCategory::Yawn => &self.yawn,
            AlertCategory::HeadTurn => &self.head_turn,
        }
    }

    fn machine_mut(&mut self, category: AlertCategory) -> &mut DebounceMachine {
        match category {
            AlertCategory::EyesClosed => &mut self.eyes,
            AlertCategory::Yawn => &mut self.yawn,
            AlertCategory::HeadTurn => &mut self.head_turn,
        }
    }

    fn latest_dispatch(&self) -> Option<Instant> {
        AlertCategory::ALL
            .into_iter()
            .filter_map(|category| self.machine(category).last_dispatched())
            .max()
    }

    /// Reset state (on subject change)
    pub fn reset(&mut self, config: &DmsConfig) -> Result<(), DmsError> {
        *self = Self::new(config)?;
        Ok(())
    }
}
