//! Per-subject frame pipeline

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::analysis::{FrameInput, FrameResult};
use crate::session::SubjectSession;
use crate::{DmsError, Monitor};

/// Why a pipeline stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// The frame source closed
    Disconnected,
    /// The result sink went away
    TransportFailed,
}

/// Channels and task of a spawned pipeline
pub struct PipelineHandle {
    pub frames: mpsc::Sender<FrameInput>,
    pub results: mpsc::Receiver<FrameResult>,
    pub task: JoinHandle<PipelineExit>,
}

/// Run the frame loop for one subject until either side closes
///
/// Frames are handled strictly in arrival order. An idle inbox is only
/// logged; the session is dropped when the loop ends.
pub async fn run_pipeline(
    monitor: Arc<Monitor>,
    mut session: SubjectSession,
    mut inbox: mpsc::Receiver<FrameInput>,
    outbox: mpsc::Sender<FrameResult>,
    idle_timeout: Duration,
) -> PipelineExit {
    info!("Starting pipeline for {}", session.subject_id());

    let exit = loop {
        match timeout(idle_timeout, inbox.recv()).await {
            Err(_) => {
                warn!(
                    "No frames from {} for {:?}, still waiting",
                    session.subject_id(),
                    idle_timeout
                );
            }
            Ok(None) => {
                debug!("Frame channel closed for {}", session.subject_id());
                break PipelineExit::Disconnected;
            }
            Ok(Some(input)) => {
                let result = monitor.handle(&mut session, input);
                if outbox.send(result).await.is_err() {
                    warn!("Result channel closed for {}", session.subject_id());
                    break PipelineExit::TransportFailed;
                }
            }
        }
    };

    info!(
        "Pipeline for {} stopped ({:?}) after {} frames",
        session.subject_id(),
        exit,
        session.state().frames_processed
    );
    exit
}

/// Open a session and run its pipeline on a new task
pub fn spawn_pipeline(
    monitor: Arc<Monitor>,
    subject_id: &str,
    capacity: usize,
    idle_timeout: Duration,
) -> Result<PipelineHandle, DmsError> {
    let session = monitor.open_session(subject_id)?;
    let (frames, inbox) = mpsc::channel(capacity.max(1));
    let (outbox, results) = mpsc::channel(capacity.max(1));

    let task = tokio::spawn(run_pipeline(monitor, session, inbox, outbox, idle_timeout));
    Ok(PipelineHandle {
        frames,
        results,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::face_with;
    use crate::tests::test_monitor;

    fn frame(ear: f32) -> FrameInput {
        FrameInput::face(face_with(ear, 0.1, 0.0), 640, 480)
    }

    #[tokio::test]
    async fn test_results_in_arrival_order() {
        let (monitor, _sink) = test_monitor();
        let mut handle = spawn_pipeline(monitor, "cab-1", 16, Duration::from_secs(30)).unwrap();

        let ears = [0.30, 0.18, 0.18, 0.18, 0.30];
        for &ear in &ears {
            handle.frames.send(frame(ear)).await.unwrap();
        }
        drop(handle.frames);

        let mut results = Vec::new();
        while let Some(result) = handle.results.recv().await {
            results.push(result);
        }
        assert_eq!(results.len(), ears.len());
        for (result, &ear) in results.iter().zip(&ears) {
            assert!((result.ear - ear).abs() < 1e-3);
        }
        let flags: Vec<bool> = results.iter().map(|r| r.eyes_closed).collect();
        assert_eq!(flags, vec![false, false, false, true, true]);

        assert_eq!(handle.task.await.unwrap(), PipelineExit::Disconnected);
    }

    #[tokio::test]
    async fn test_closed_outbox_ends_pipeline() {
        let (monitor, _sink) = test_monitor();
        let PipelineHandle {
            frames,
            results,
            task,
        } = spawn_pipeline(monitor, "cab-2", 4, Duration::from_secs(30)).unwrap();

        drop(results);
        frames.send(frame(0.3)).await.unwrap();
        assert_eq!(task.await.unwrap(), PipelineExit::TransportFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_keeps_waiting() {
        let (monitor, _sink) = test_monitor();
        let mut handle = spawn_pipeline(monitor, "cab-3", 4, Duration::from_millis(100)).unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(!handle.task.is_finished());

        handle.frames.send(frame(0.3)).await.unwrap();
        let result = handle.results.recv().await.unwrap();
        assert!(result.face_detected);
        assert_eq!(result.subject_id, "cab-3");

        drop(handle.frames);
        assert_eq!(handle.task.await.unwrap(), PipelineExit::Disconnected);
    }
}
