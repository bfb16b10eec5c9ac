//! Driver Monitoring System (DMS)
//!
//! Real-time drowsiness and distraction detection from facial landmarks:
//! - Eye/mouth aspect ratios and a yaw proxy per frame
//! - Rolling-mean smoothing of noisy signals
//! - Per-category debounce with hysteresis and cooldown
//! - One alert dispatch per sustained episode

pub mod analysis;
pub mod config;
pub mod debounce;
pub mod geometry;
pub mod landmarks;
pub mod pipeline;
pub mod session;
pub mod smoother;
pub mod state;

pub use alerting::{AlertCategory, AlertEvent, FrameRef};
pub use analysis::{FrameInput, FrameOutcome, FrameResult};
pub use config::{CategoryConfig, CooldownScope, DmsConfig};
pub use debounce::{DebounceMachine, DebounceState, Transition};
pub use geometry::FrameMetrics;
pub use landmarks::{Extraction, LandmarkExtractor, LandmarkLayout, LandmarkSet, Point};
pub use pipeline::{run_pipeline, spawn_pipeline, PipelineExit, PipelineHandle};
pub use session::{SessionRegistry, SubjectSession};
pub use state::{CategoryFlags, SubjectState};

use alerting::AlertDispatcher;
use ring_buffer::RingBufferError;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Landmark extraction failed: {0}")]
    Extraction(String),

    #[error("Smoothing window: {0}")]
    Window(#[from] RingBufferError),
}

/// Driver monitor: runs sessions and hands their alerts to the dispatcher
pub struct Monitor {
    config: Arc<DmsConfig>,
    dispatcher: Arc<AlertDispatcher>,
}

impl Monitor {
    /// Create a monitor with a validated configuration
    pub fn new(config: DmsConfig, dispatcher: Arc<AlertDispatcher>) -> Result<Self, DmsError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            dispatcher,
        })
    }

    pub fn config(&self) -> &Arc<DmsConfig> {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    pub fn open_session(&self, subject_id: &str) -> Result<SubjectSession, DmsError> {
        SubjectSession::new(subject_id, Arc::clone(&self.config))
    }

    /// Empty registry sharing this monitor's configuration
    pub fn registry(&self) -> SessionRegistry {
        SessionRegistry::new(Arc::clone(&self.config))
    }

    /// Analyze a frame and dispatch any new alert episodes
    pub fn handle(&self, session: &mut SubjectSession, input: FrameInput) -> FrameResult {
        let outcome = session.process(input, Instant::now());
        self.finish(outcome)
    }

    /// Like [`Monitor::handle`] for a registry-held session
    pub fn handle_in(
        &self,
        registry: &mut SessionRegistry,
        subject_id: &str,
        input: FrameInput,
    ) -> Result<FrameResult, DmsError> {
        let outcome = registry.process(subject_id, input, Instant::now())?;
        Ok(self.finish(outcome))
    }

    fn finish(&self, outcome: FrameOutcome) -> FrameResult {
        metrics::counter!("dms_frames_processed_total").increment(1);
        if !outcome.result.face_detected {
            metrics::counter!("dms_frames_no_face_total").increment(1);
        }

        for event in outcome.alerts {
            metrics::counter!("dms_alerts_total", "category" => event.category.as_str())
                .increment(1);
            self.dispatcher.dispatch(event);
        }

        debug!(
            "{}: ear={:.3} mar={:.3} yaw={:.1} alarm={}",
            outcome.result.subject_id,
            outcome.result.ear,
            outcome.result.mar,
            outcome.result.yaw,
            outcome.result.alarm_active
        );
        outcome.result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::tests::face_with;
    use alerting::{AlertConfig, AlertSound, EvidenceSink, SinkError};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) captured: Mutex<Vec<AlertEvent>>,
    }

    impl EvidenceSink for RecordingSink {
        fn capture(&self, event: &AlertEvent) -> Result<(), SinkError> {
            self.captured.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct SilentSound;

    impl AlertSound for SilentSound {
        fn play(&self, _category: AlertCategory) -> Result<(), SinkError> {
            Ok(())
        }
    }

    /// Monitor with default config and a recording evidence sink
    pub(crate) fn test_monitor() -> (Arc<Monitor>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = AlertDispatcher::spawn(
            AlertConfig::default(),
            sink.clone(),
            Arc::new(SilentSound),
        );
        let monitor = Monitor::new(DmsConfig::default(), Arc::new(dispatcher)).unwrap();
        (Arc::new(monitor), sink)
    }

    async fn wait_for_captures(sink: &RecordingSink, count: usize) {
        for _ in 0..200 {
            if sink.captured.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} captures");
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (monitor, _) = test_monitor();
        let config = DmsConfig {
            smoothing_window: 0,
            ..Default::default()
        };
        let result = Monitor::new(config, Arc::clone(monitor.dispatcher()));
        assert!(matches!(result, Err(DmsError::Config(_))));
    }

    #[tokio::test]
    async fn test_onset_dispatches_one_capture() {
        let (monitor, sink) = test_monitor();
        let mut session = monitor.open_session("cab-1").unwrap();

        let mut last = None;
        for seq in 1..=3 {
            let input = FrameInput::face(face_with(0.18, 0.1, 0.0), 640, 480)
                .with_frame(FrameRef::new(seq));
            last = Some(monitor.handle(&mut session, input));
        }
        let last = last.unwrap();
        assert!(last.eyes_closed && last.alarm_active);

        wait_for_captures(&sink, 1).await;
        let captured = sink.captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].category, AlertCategory::EyesClosed);
        assert_eq!(captured[0].frame_sequence, 3);
        assert_eq!(monitor.dispatcher().stats().captures_requested, 1);
    }

    #[tokio::test]
    async fn test_handle_in_registry() {
        let (monitor, _) = test_monitor();
        let mut registry = monitor.registry();

        let input = FrameInput::face(face_with(0.3, 0.1, 0.0), 640, 480);
        let result = monitor.handle_in(&mut registry, "cab-9", input).unwrap();
        assert_eq!(result.subject_id, "cab-9");
        assert!(result.face_detected);
        assert!(registry.contains("cab-9"));

        let lost = monitor
            .handle_in(&mut registry, "cab-9", FrameInput::no_face(640, 480))
            .unwrap();
        assert!(!lost.face_detected);
    }
}
