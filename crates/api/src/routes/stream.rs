//! Per-connection WebSocket pipeline
//!
//! Each connection gets its own subject session and pipeline task. Text
//! messages carry landmarks; binary messages carry an encoded frame that is
//! either run through the landmark extractor or kept as the evidence image
//! for the next landmark message.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use dms::{
    run_pipeline, DmsError, FrameInput, FrameRef, FrameResult, LandmarkExtractor, Monitor,
    SubjectSession,
};

use crate::config::ServerSettings;
use crate::protocol::FrameMessage;
use crate::{ApiError, AppState, ErrorReply, SharedState};

/// Query parameters for the stream endpoint
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Subject to track; a fresh id is generated when absent
    pub subject: Option<String>,
}

struct Connection {
    monitor: Arc<Monitor>,
    extractor: Option<Arc<dyn LandmarkExtractor>>,
    live: broadcast::Sender<FrameResult>,
    server: ServerSettings,
}

impl Connection {
    fn from_state(state: &AppState) -> Self {
        Self {
            monitor: Arc::clone(&state.monitor),
            extractor: state.extractor.clone(),
            live: state.live.clone(),
            server: state.server.clone(),
        }
    }
}

/// Upgrade to a streaming connection
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let conn = Connection::from_state(&*state.read().await);

    let subject_id = query
        .subject
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let session = match conn.monitor.open_session(&subject_id) {
        Ok(session) => session,
        Err(e) => return ApiError::from(e).into_response(),
    };

    ws.max_message_size(conn.server.max_message_bytes)
        .on_upgrade(move |socket: WebSocket| {
            let (ws_tx, ws_rx) = socket.split();
            serve_connection(ws_tx, ws_rx, conn, session)
        })
}

/// Run one client's reader, pipeline and writer until the client leaves
async fn serve_connection<S, R, E>(
    ws_tx: S,
    mut ws_rx: R,
    conn: Connection,
    session: SubjectSession,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let subject_id = session.subject_id().to_string();
    info!("Client connected: {}", subject_id);

    let depth = conn.server.frame_queue_depth.max(1);
    let (frames_tx, frames_rx) = mpsc::channel(depth);
    let (results_tx, results_rx) = mpsc::channel(depth);
    let (errors_tx, errors_rx) = mpsc::channel(depth);

    let pipeline = tokio::spawn(run_pipeline(
        Arc::clone(&conn.monitor),
        session,
        frames_rx,
        results_tx,
        conn.server.idle_timeout(),
    ));
    let writer = tokio::spawn(write_replies(ws_tx, results_rx, errors_rx, conn.live.clone()));

    let mut reader = FrameReader::new(conn.extractor.clone());
    while let Some(message) = ws_rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("WebSocket error from {}: {}", subject_id, e);
                break;
            }
        };

        match reader.read(message).await {
            Ok(Incoming::Frame(input)) => {
                if frames_tx.send(input).await.is_err() {
                    break;
                }
            }
            Ok(Incoming::Pending) => {}
            Ok(Incoming::Close) => break,
            Err(e) => {
                if errors_tx.try_send(ErrorReply::new(client_message(&e))).is_err() {
                    debug!("Dropped error reply for {}", subject_id);
                }
            }
        }
    }

    drop(frames_tx);
    drop(errors_tx);

    match pipeline.await {
        Ok(exit) => info!("Client disconnected: {} ({:?})", subject_id, exit),
        Err(e) => warn!("Pipeline task for {} failed: {}", subject_id, e),
    }
    if let Err(e) = writer.await {
        warn!("Writer task for {} failed: {}", subject_id, e);
    }
    conn.monitor.dispatcher().forget_subject(&subject_id);
}

/// What a single client message amounts to
#[derive(Debug)]
pub(crate) enum Incoming {
    Frame(FrameInput),
    /// Nothing to process yet (image held, ping, pong)
    Pending,
    Close,
}

/// Turns client messages into frame inputs, in arrival order
pub(crate) struct FrameReader {
    extractor: Option<Arc<dyn LandmarkExtractor>>,
    sequence: u64,
    pending_image: Option<Vec<u8>>,
}

impl FrameReader {
    pub(crate) fn new(extractor: Option<Arc<dyn LandmarkExtractor>>) -> Self {
        Self {
            extractor,
            sequence: 0,
            pending_image: None,
        }
    }

    pub(crate) async fn read(&mut self, message: Message) -> Result<Incoming, ApiError> {
        match message {
            Message::Text(text) => {
                let message = FrameMessage::parse(&text)?;
                let frame = match self.pending_image.take() {
                    Some(image) => FrameRef::with_image(self.next_sequence(), image),
                    None => FrameRef::new(self.next_sequence()),
                };
                Ok(Incoming::Frame(message.into_input(frame)))
            }
            Message::Binary(image) => match self.extractor.clone() {
                Some(extractor) => {
                    let frame = FrameRef::with_image(self.next_sequence(), image);
                    let job = frame.clone();
                    let extraction = tokio::task::spawn_blocking(move || extractor.extract(&job))
                        .await
                        .map_err(|e| DmsError::Extraction(e.to_string()))??;
                    Ok(Incoming::Frame(FrameInput::from_extraction(extraction, frame)))
                }
                None => {
                    self.pending_image = Some(image);
                    Ok(Incoming::Pending)
                }
            },
            Message::Close(_) => Ok(Incoming::Close),
            Message::Ping(_) | Message::Pong(_) => Ok(Incoming::Pending),
        }
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

/// Client-safe description of a failed message
fn client_message(error: &ApiError) -> String {
    match error {
        ApiError::BadRequest(_) => error.to_string(),
        other => {
            warn!("Frame processing failed: {}", other);
            "frame could not be processed".to_string()
        }
    }
}

/// Send results and error replies until both channels close
pub(crate) async fn write_replies<S>(
    mut sink: S,
    mut results: mpsc::Receiver<FrameResult>,
    mut errors: mpsc::Receiver<ErrorReply>,
    live: broadcast::Sender<FrameResult>,
) where
    S: Sink<Message> + Unpin,
{
    loop {
        let text = tokio::select! {
            Some(result) = results.recv() => {
                // No observers is fine
                let _ = live.send(result.clone());
                serde_json::to_string(&result)
            }
            Some(error) = errors.recv() => serde_json::to_string(&error),
            else => break,
        };

        let text = match text {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode reply: {}", e);
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            debug!("Client went away, stopping writer");
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::face_landmarks;
    use dms::{Extraction, LandmarkSet, Point};
    use futures::channel::mpsc as fmpsc;

    struct FixedExtractor;

    impl LandmarkExtractor for FixedExtractor {
        fn extract(&self, frame: &FrameRef) -> Result<Extraction, DmsError> {
            match frame.image() {
                Some([0xFF, ..]) => Ok(Extraction {
                    landmarks: Some(LandmarkSet::new(vec![Point::new(1.0, 2.0)])),
                    width: 640,
                    height: 480,
                }),
                _ => Err(DmsError::Extraction("unsupported format".into())),
            }
        }
    }

    fn text_frame() -> Message {
        let message = serde_json::json!({
            "landmarks": face_landmarks(0.3),
            "width": 640,
            "height": 480,
        });
        Message::Text(message.to_string())
    }

    #[tokio::test]
    async fn test_image_attaches_to_next_landmarks() {
        let mut reader = FrameReader::new(None);

        assert!(matches!(
            reader.read(Message::Binary(vec![1, 2, 3])).await.unwrap(),
            Incoming::Pending
        ));
        let Incoming::Frame(first) = reader.read(text_frame()).await.unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(first.frame.image(), Some(&[1u8, 2, 3][..]));
        assert_eq!(first.frame.sequence(), 1);

        let Incoming::Frame(second) = reader.read(text_frame()).await.unwrap() else {
            panic!("expected a frame");
        };
        assert!(second.frame.image().is_none());
        assert_eq!(second.frame.sequence(), 2);
    }

    #[tokio::test]
    async fn test_binary_goes_through_extractor() {
        let mut reader = FrameReader::new(Some(Arc::new(FixedExtractor)));

        let Incoming::Frame(input) = reader.read(Message::Binary(vec![0xFF, 0xD8])).await.unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!(input.frame_width, 640);
        assert_eq!(input.landmarks.unwrap().len(), 1);
        assert!(input.frame.image().is_some());

        let err = reader.read(Message::Binary(vec![0x00])).await.unwrap_err();
        assert!(matches!(err, ApiError::Dms(DmsError::Extraction(_))));
        assert_eq!(client_message(&err), "frame could not be processed");
    }

    #[tokio::test]
    async fn test_malformed_text_is_bad_request() {
        let mut reader = FrameReader::new(None);
        let err = reader
            .read(Message::Text("{\"width\": 1}".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(client_message(&err).contains("invalid frame message"));

        assert!(matches!(
            reader.read(Message::Close(None)).await.unwrap(),
            Incoming::Close
        ));
    }

    #[tokio::test]
    async fn test_connection_round_trip_and_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let state = crate::test_support::state(dir.path());
        let conn = Connection::from_state(&*state.read().await);
        let monitor = Arc::clone(&conn.monitor);
        let session = monitor.open_session("cab-7").unwrap();

        let (client_tx, server_rx) = fmpsc::unbounded::<Result<Message, std::io::Error>>();
        let (server_tx, mut client_rx) = fmpsc::unbounded::<Message>();

        let closed_eyes = serde_json::json!({
            "landmarks": face_landmarks(0.18),
            "width": 640,
            "height": 480,
        })
        .to_string();
        for _ in 0..3 {
            client_tx
                .unbounded_send(Ok(Message::Text(closed_eyes.clone())))
                .unwrap();
        }
        client_tx
            .unbounded_send(Ok(Message::Text("{oops".into())))
            .unwrap();
        client_tx.unbounded_send(Ok(Message::Close(None))).unwrap();

        serve_connection(server_tx, server_rx, conn, session).await;

        let mut results = Vec::new();
        let mut errors = 0;
        while let Some(Message::Text(text)) = client_rx.next().await {
            let reply: serde_json::Value = serde_json::from_str(&text).unwrap();
            if reply["error"].is_string() {
                errors += 1;
            } else {
                results.push(reply);
            }
        }
        assert_eq!(errors, 1);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r["subject_id"] == "cab-7"));
        assert_eq!(results[2]["eyes_closed"], true);
        assert_eq!(results[2]["alarm_active"], true);

        // The episode reached the dispatcher, and the ledger entry went with the session
        assert_eq!(monitor.dispatcher().stats().captures_requested, 1);
        assert!(monitor.dispatcher().pending().is_empty());
    }

    #[tokio::test]
    async fn test_writer_sends_results_and_errors() {
        let (sink, mut sent) = fmpsc::unbounded();
        let (results_tx, results_rx) = mpsc::channel(4);
        let (errors_tx, errors_rx) = mpsc::channel(4);
        let (live, mut observer) = broadcast::channel(4);

        let writer = tokio::spawn(write_replies(sink, results_rx, errors_rx, live));

        results_tx.send(FrameResult::no_face("cab-1")).await.unwrap();
        errors_tx.send(ErrorReply::new("bad frame")).await.unwrap();
        drop(results_tx);
        drop(errors_tx);
        writer.await.unwrap();

        let mut replies = Vec::new();
        while let Some(Message::Text(text)) = sent.next().await {
            replies.push(serde_json::from_str::<serde_json::Value>(&text).unwrap());
        }
        assert_eq!(replies.len(), 2);
        assert!(replies
            .iter()
            .any(|r| r["subject_id"] == "cab-1" && r["face_detected"] == false));
        assert!(replies.iter().any(|r| r["error"] == "bad frame"));

        assert_eq!(observer.recv().await.unwrap().subject_id, "cab-1");
    }
}
