//! Realtime progress channel.
//!
//! Every connected client gets a text frame per published snapshot:
//! `{"event":"progress","data":{"id":..,"file":..,"status":..,"progress":..}}`.
//! Nothing is replayed on connect; clients that need the current state
//! fetch `/videos`. Messages sent by the client are ignored.

use crate::models::{ProgressEvent, UploadRecord};
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use tokio::sync::broadcast::error::RecvError;

pub async fn progress_socket(ws: WebSocketUpgrade, State(state): State<crate::AppState>) -> Response {
    // Subscribe before the upgrade completes so no snapshot slips between.
    let rx = state.broadcaster.subscribe();
    ws.on_upgrade(move |socket| forward_progress(socket, rx))
}

pub fn progress_frame(record: UploadRecord) -> Option<String> {
    serde_json::to_string(&ProgressEvent::new(record)).ok()
}

async fn forward_progress(
    mut socket: WebSocket,
    mut rx: tokio::sync::broadcast::Receiver<UploadRecord>,
) {
    tracing::info!("🔌 Socket connected");

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(record) => {
                    let Some(text) = progress_frame(record) else {
                        continue;
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Socket subscriber lagged, skipped {} snapshots", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("🔌 Socket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_carries_event_name_and_snapshot() {
        let mut record = UploadRecord::new("42".into(), "abc".into());
        record.advance(100);

        let frame = progress_frame(record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "progress");
        assert_eq!(value["data"]["id"], "42");
        assert_eq!(value["data"]["file"], "abc");
        assert_eq!(value["data"]["status"], "safe");
        assert_eq!(value["data"]["progress"], 100);
    }
}
