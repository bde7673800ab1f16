//! WebSocket Handler
//!
//! `GET /ws/:user_id`. Chat messages are answered with a streamed reply
//! naming the session's current mode; push notifications from the upload
//! routes arrive through the hub.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::state::DevState;
use crate::chat::{ClientFrame, ServerFrame};

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<DevState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket(socket: WebSocket, session_id: String, state: Arc<DevState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let connection_id = state.hub.register(&session_id, tx.clone()).await;

    // Forward queued frames to the socket
    let conn_id_for_send = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.encode() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                tracing::debug!(connection_id = %conn_id_for_send, "WebSocket send failed, closing");
                break;
            }
        }
    });

    let state_for_recv = Arc::clone(&state);
    let session_for_recv = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&state_for_recv, &session_for_recv, &tx, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_for_recv, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(&session_id, &connection_id).await;
}

/// Returns false if the connection should be closed
async fn handle_ws_message(
    state: &DevState,
    session_id: &str,
    tx: &mpsc::UnboundedSender<ServerFrame>,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            match ClientFrame::decode(&text) {
                Ok(ClientFrame::Message { content }) => {
                    let mode = state.mode(session_id).await;
                    tracing::debug!(session_id = %session_id, mode = %mode, "Chat message");
                    for frame in reply_frames(&format!("[{}] You said: {}", mode, content)) {
                        if tx.send(frame).is_err() {
                            return false;
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "Invalid client frame");
                    // Keep the connection open
                    let _ = tx.send(ServerFrame::Error {
                        error: format!("Invalid message format: {}", e),
                    });
                }
            }
            true
        }
        Message::Binary(_) => {
            let _ = tx.send(ServerFrame::Error {
                error: "Binary messages not supported".to_string(),
            });
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(session_id = %session_id, "Client requested close");
            false
        }
    }
}

/// A reply streamed word by word, then closed
fn reply_frames(reply: &str) -> Vec<ServerFrame> {
    reply
        .split_inclusive(' ')
        .map(|token| ServerFrame::Chunk {
            content: token.to_string(),
        })
        .chain(std::iter::once(ServerFrame::StreamEnd))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_frames_reassemble() {
        let frames = reply_frames("[preloaded] You said: hi");
        assert_eq!(frames.last(), Some(&ServerFrame::StreamEnd));

        let text: String = frames
            .iter()
            .filter_map(|f| match f {
                ServerFrame::Chunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "[preloaded] You said: hi");
    }
}
