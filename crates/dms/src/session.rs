//! Subject sessions and the session registry

use alerting::AlertEvent;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::analysis::{FrameInput, FrameOutcome, FrameResult};
use crate::config::DmsConfig;
use crate::debounce::Transition;
use crate::geometry::FrameMetrics;
use crate::state::SubjectState;
use crate::DmsError;

/// Tracking state for one monitored subject
///
/// Processing is synchronous and has no side effects beyond the session's
/// own state; dispatching the returned alerts is up to the caller.
#[derive(Debug)]
pub struct SubjectSession {
    subject_id: String,
    config: Arc<DmsConfig>,
    state: SubjectState,
    last_seen: Instant,
}

impl SubjectSession {
    pub fn new(subject_id: impl Into<String>, config: Arc<DmsConfig>) -> Result<Self, DmsError> {
        let state = SubjectState::new(&config)?;
        let subject_id = subject_id.into();
        metrics::gauge!("dms_active_sessions").increment(1.0);
        debug!("Session opened for {}", subject_id);

        Ok(Self {
            subject_id,
            config,
            state,
            last_seen: Instant::now(),
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn state(&self) -> &SubjectState {
        &self.state
    }

    /// When the last frame arrived
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Analyze one frame
    pub fn process(&mut self, input: FrameInput, now: Instant) -> FrameOutcome {
        self.last_seen = now;
        let Some(landmarks) = input.landmarks.as_ref() else {
            return self.process_no_face();
        };

        let raw = FrameMetrics::compute(landmarks, &self.config.landmarks, input.frame_width);
        let step = self.state.step(raw, &self.config, now);

        let mut alerts = Vec::new();
        for (category, transition) in step.transitions {
            match transition {
                Transition::Onset => {
                    info!("{} alert for {}", category, self.subject_id);
                    alerts.push(AlertEvent::new(
                        category,
                        self.subject_id.as_str(),
                        input.frame.clone(),
                    ));
                }
                Transition::SuppressedOnset => {
                    debug!("{} alert for {} within cooldown", category, self.subject_id);
                }
                Transition::Cleared => {
                    debug!("{} cleared for {}", category, self.subject_id);
                }
                Transition::None => {}
            }
        }

        let flags = self.state.active_flags();
        let result = FrameResult {
            subject_id: self.subject_id.clone(),
            face_detected: true,
            ear: step.signals.ear.unwrap_or(0.0),
            mar: step.signals.mar.unwrap_or(0.0),
            yaw: step.signals.yaw.unwrap_or(0.0),
            eyes_closed: flags.eyes_closed,
            yawning: flags.yawning,
            head_turned: flags.head_turned,
            alarm_active: flags.any(),
            timestamp: Utc::now(),
        };

        FrameOutcome { result, alerts }
    }

    fn process_no_face(&mut self) -> FrameOutcome {
        for (category, transition) in self.state.neutral() {
            if transition == Transition::Cleared {
                debug!("{} cleared for {} (face lost)", category, self.subject_id);
            }
        }

        if self.state.face_absent_frames == self.config.face_absent_warn_frames {
            warn!(
                "No face detected for {} consecutive frames ({})",
                self.state.face_absent_frames, self.subject_id
            );
        }

        FrameOutcome {
            result: FrameResult::no_face(self.subject_id.as_str()),
            alerts: Vec::new(),
        }
    }

    /// Forget all tracking history
    pub fn reset(&mut self) -> Result<(), DmsError> {
        self.state.reset(&self.config)
    }
}

impl Drop for SubjectSession {
    fn drop(&mut self) {
        metrics::gauge!("dms_active_sessions").decrement(1.0);
        debug!(
            "Session closed for {} after {} frames",
            self.subject_id, self.state.frames_processed
        );
    }
}

/// Sessions keyed by subject id
#[derive(Debug)]
pub struct SessionRegistry {
    config: Arc<DmsConfig>,
    sessions: HashMap<String, SubjectSession>,
}

impl SessionRegistry {
    pub fn new(config: Arc<DmsConfig>) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// Session for `subject_id`, created on first use
    pub fn get_or_create(&mut self, subject_id: &str) -> Result<&mut SubjectSession, DmsError> {
        if !self.sessions.contains_key(subject_id) {
            let session = SubjectSession::new(subject_id, Arc::clone(&self.config))?;
            self.sessions.insert(subject_id.to_string(), session);
        }
        self.sessions
            .get_mut(subject_id)
            .ok_or_else(|| DmsError::Config(format!("session {subject_id} vanished")))
    }

    /// Process one frame for a subject
    pub fn process(
        &mut self,
        subject_id: &str,
        input: FrameInput,
        now: Instant,
    ) -> Result<FrameOutcome, DmsError> {
        Ok(self.get_or_create(subject_id)?.process(input, now))
    }

    /// Drop a subject's state; true if it existed
    pub fn remove(&mut self, subject_id: &str) -> bool {
        self.sessions.remove(subject_id).is_some()
    }

    /// Drop sessions that have seen no frame for `max_idle`; returns their ids
    pub fn evict_idle(&mut self, max_idle: Duration, now: Instant) -> Vec<String> {
        let mut evicted = Vec::new();
        self.sessions.retain(|id, session| {
            let keep = now.saturating_duration_since(session.last_seen) < max_idle;
            if !keep {
                evicted.push(id.clone());
            }
            keep
        });
        evicted.sort();
        evicted
    }

    pub fn contains(&self, subject_id: &str) -> bool {
        self.sessions.contains_key(subject_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }
}
