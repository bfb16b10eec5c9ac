//! Fire-and-forget alert dispatch

use crate::{AlertCategory, AlertConfig, AlertEvent, AlertManager, AlertSound, EvidenceSink};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Snapshot of dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub captures_requested: u64,
    pub cues_requested: u64,
    pub cues_dropped: u64,
    pub throttled: u64,
}

#[derive(Default)]
struct Counters {
    captures_requested: AtomicU64,
    cues_requested: AtomicU64,
    cues_dropped: AtomicU64,
    throttled: AtomicU64,
}

/// Hands alert side effects to background tasks
///
/// Evidence capture runs on the blocking pool, one task per event. Audio
/// cues go through a bounded queue drained by a single worker so the audio
/// device only ever plays one cue at a time. `dispatch` itself never waits.
pub struct AlertDispatcher {
    evidence: Arc<dyn EvidenceSink>,
    audio_tx: mpsc::Sender<AlertCategory>,
    manager: Mutex<AlertManager>,
    counters: Counters,
}

impl AlertDispatcher {
    /// Create the dispatcher and start its audio worker
    ///
    /// Must be called from within a tokio runtime. The worker stops once the
    /// dispatcher is dropped.
    pub fn spawn(
        config: AlertConfig,
        evidence: Arc<dyn EvidenceSink>,
        sound: Arc<dyn AlertSound>,
    ) -> Self {
        let (audio_tx, audio_rx) = mpsc::channel(config.audio_queue_depth.max(1));
        tokio::spawn(audio_worker(audio_rx, sound));
        info!(
            "Alert dispatcher started (audio queue depth {})",
            config.audio_queue_depth.max(1)
        );

        Self {
            evidence,
            audio_tx,
            manager: Mutex::new(AlertManager::new(config)),
            counters: Counters::default(),
        }
    }

    /// Request evidence capture and an audible cue for a new alert episode
    pub fn dispatch(&self, event: AlertEvent) {
        let category = event.category;

        match self.audio_tx.try_send(category) {
            Ok(()) => {
                self.counters.cues_requested.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                self.counters.cues_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Audio queue full, dropping {} cue", category);
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.cues_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Audio worker stopped, dropping {} cue", category);
            }
        }

        let allowed = {
            let mut manager = self.manager();
            let now = Instant::now();
            if manager.should_fire(&event.subject_id, now) {
                manager.record_fire(&event.subject_id, category, now);
                true
            } else {
                false
            }
        };

        if !allowed {
            self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.counters.captures_requested.fetch_add(1, Ordering::Relaxed);
        let sink = Arc::clone(&self.evidence);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = sink.capture(&event) {
                warn!(
                    "Evidence capture failed for {} alert on {}: {}",
                    event.category, event.subject_id, e
                );
            }
        });
    }

    /// Acknowledge the latest alert of a category for a subject
    pub fn acknowledge(&self, subject_id: &str, category: AlertCategory) -> bool {
        self.manager().acknowledge(subject_id, category)
    }

    /// Unacknowledged (subject, category, fire count) entries
    pub fn pending(&self) -> Vec<(String, AlertCategory, usize)> {
        self.manager()
            .get_pending()
            .into_iter()
            .map(|(subject, category, state)| (subject.to_string(), category, state.fire_count))
            .collect()
    }

    /// Drop ledger entries for a subject whose session ended
    pub fn forget_subject(&self, subject_id: &str) {
        self.manager().forget_subject(subject_id);
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            captures_requested: self.counters.captures_requested.load(Ordering::Relaxed),
            cues_requested: self.counters.cues_requested.load(Ordering::Relaxed),
            cues_dropped: self.counters.cues_dropped.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
        }
    }

    fn manager(&self) -> MutexGuard<'_, AlertManager> {
        // A panic while holding the ledger cannot leave it inconsistent
        self.manager.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn audio_worker(mut rx: mpsc::Receiver<AlertCategory>, sound: Arc<dyn AlertSound>) {
    while let Some(category) = rx.recv().await {
        let sound = Arc::clone(&sound);
        match tokio::task::spawn_blocking(move || sound.play(category)).await {
            Ok(Ok(())) => debug!("Played {} cue", category),
            Ok(Err(e)) => warn!("Error playing alert sound: {}", e),
            Err(e) => warn!("Audio task failed: {}", e),
        }
    }
    debug!("Audio worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameRef, SinkError};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        captured: Mutex<Vec<AlertEvent>>,
        fail: bool,
    }

    impl EvidenceSink for RecordingSink {
        fn capture(&self, event: &AlertEvent) -> Result<(), SinkError> {
            self.captured.lock().unwrap().push(event.clone());
            if self.fail {
                Err(SinkError::Snapshot("disk full".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingSound {
        played: Mutex<Vec<AlertCategory>>,
    }

    impl AlertSound for RecordingSound {
        fn play(&self, category: AlertCategory) -> Result<(), SinkError> {
            self.played.lock().unwrap().push(category);
            Ok(())
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn event(category: AlertCategory) -> AlertEvent {
        AlertEvent::new(category, "cab-1", FrameRef::new(1))
    }

    #[tokio::test]
    async fn test_dispatch_reaches_both_collaborators() {
        let sink = Arc::new(RecordingSink::default());
        let sound = Arc::new(RecordingSound::default());
        let dispatcher = AlertDispatcher::spawn(
            AlertConfig::default(),
            sink.clone(),
            sound.clone(),
        );

        dispatcher.dispatch(event(AlertCategory::EyesClosed));

        wait_until(|| sink.captured.lock().unwrap().len() == 1).await;
        wait_until(|| sound.played.lock().unwrap().len() == 1).await;
        assert_eq!(sound.played.lock().unwrap()[0], AlertCategory::EyesClosed);

        let stats = dispatcher.stats();
        assert_eq!(stats.captures_requested, 1);
        assert_eq!(stats.cues_requested, 1);
        assert_eq!(dispatcher.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_is_contained() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let dispatcher = AlertDispatcher::spawn(
            AlertConfig::default(),
            sink.clone(),
            Arc::new(RecordingSound::default()),
        );

        dispatcher.dispatch(event(AlertCategory::Yawn));
        dispatcher.dispatch(event(AlertCategory::HeadTurn));

        wait_until(|| sink.captured.lock().unwrap().len() == 2).await;
        assert_eq!(dispatcher.stats().captures_requested, 2);
    }

    #[tokio::test]
    async fn test_throttle_skips_capture_but_keeps_cue() {
        let sink = Arc::new(RecordingSink::default());
        let config = AlertConfig {
            max_alerts_per_hour: 1,
            ..Default::default()
        };
        let dispatcher =
            AlertDispatcher::spawn(config, sink.clone(), Arc::new(RecordingSound::default()));

        dispatcher.dispatch(event(AlertCategory::EyesClosed));
        dispatcher.dispatch(event(AlertCategory::EyesClosed));

        let stats = dispatcher.stats();
        assert_eq!(stats.captures_requested, 1);
        assert_eq!(stats.throttled, 1);
        assert_eq!(stats.cues_requested + stats.cues_dropped, 2);
    }

    #[tokio::test]
    async fn test_throttled_subject_does_not_block_others() {
        let sink = Arc::new(RecordingSink::default());
        let config = AlertConfig {
            max_alerts_per_hour: 1,
            ..Default::default()
        };
        let dispatcher =
            AlertDispatcher::spawn(config, sink.clone(), Arc::new(RecordingSound::default()));

        for subject in ["noisy", "noisy", "noisy-2", "noisy-2", "quiet"] {
            dispatcher.dispatch(AlertEvent::new(
                AlertCategory::EyesClosed,
                subject,
                FrameRef::new(1),
            ));
        }

        wait_until(|| sink.captured.lock().unwrap().len() == 3).await;
        let mut captured: Vec<String> = sink
            .captured
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.subject_id.clone())
            .collect();
        captured.sort();
        assert_eq!(captured, vec!["noisy", "noisy-2", "quiet"]);
        assert_eq!(dispatcher.stats().throttled, 2);
    }

    #[tokio::test]
    async fn test_acknowledge_clears_pending() {
        let dispatcher = AlertDispatcher::spawn(
            AlertConfig::default(),
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingSound::default()),
        );
        dispatcher.dispatch(event(AlertCategory::HeadTurn));

        assert!(dispatcher.acknowledge("cab-1", AlertCategory::HeadTurn));
        assert!(dispatcher.pending().is_empty());
    }
}
