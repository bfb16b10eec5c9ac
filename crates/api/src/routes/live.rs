//! Live result fan-out for observers

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use dms::FrameResult;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::SharedState;

/// Subscribe to every result produced by any connection
pub async fn live_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    let updates = state.read().await.live.subscribe();
    ws.on_upgrade(move |socket| serve_observer(socket, updates))
}

async fn serve_observer(socket: WebSocket, updates: broadcast::Receiver<FrameResult>) {
    info!("Live observer connected");
    let (sink, incoming) = socket.split();
    relay(sink, incoming, updates).await;
    info!("Live observer disconnected");
}

/// Forward results until the observer closes or the feed ends
///
/// A slow observer skips the results it missed instead of stalling the feed.
pub(crate) async fn relay<S, R, E>(
    mut sink: S,
    mut incoming: R,
    mut updates: broadcast::Receiver<FrameResult>,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(result) => {
                    let text = match serde_json::to_string(&result) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode live result: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Live observer lagged, skipped {} results", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;

    #[tokio::test]
    async fn test_relay_forwards_until_close() {
        let (sink, mut sent) = fmpsc::unbounded();
        let (client_tx, client_rx) = fmpsc::unbounded::<Result<Message, ()>>();
        let (live, updates) = broadcast::channel(8);

        let task = tokio::spawn(relay(sink, client_rx, updates));

        live.send(FrameResult::no_face("cab-1")).unwrap();
        let Some(Message::Text(text)) = sent.next().await else {
            panic!("expected a text message");
        };
        assert!(text.contains("cab-1"));

        client_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_lagging_observer_skips_ahead() {
        let (sink, mut sent) = fmpsc::unbounded();
        let (_client_tx, client_rx) = fmpsc::unbounded::<Result<Message, ()>>();
        let (live, updates) = broadcast::channel(2);

        for i in 0..5 {
            live.send(FrameResult::no_face(format!("cab-{i}"))).unwrap();
        }
        let task = tokio::spawn(relay(sink, client_rx, updates));

        // Only the two newest survive the overflow
        let mut subjects = Vec::new();
        for _ in 0..2 {
            let Some(Message::Text(text)) = sent.next().await else {
                panic!("expected a text message");
            };
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            subjects.push(value["subject_id"].as_str().unwrap().to_string());
        }
        assert_eq!(subjects, vec!["cab-3", "cab-4"]);

        drop(live);
        task.await.unwrap();
    }
}
