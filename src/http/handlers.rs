use super::state::AppState;
use crate::session::{Inbound, Outbound, OutboundSink, ReciteSession};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use futures::future;
use futures::stream::{SplitSink, SplitStream, Stream, StreamExt};
use futures::SinkExt;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// How long queued messages may take to flush after a session ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
}

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            active_sessions: state.active_sessions(),
        }),
    )
}

/// GET /ws
/// Upgrade to a WebSocket carrying one reciting session
pub async fn ws_session(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    let (outbound, outbound_rx) = OutboundSink::channel();

    let writer = tokio::spawn(write_outbound(sender, outbound_rx));

    let mut session = ReciteSession::new(state.context.clone(), outbound);
    info!("Client connected, session {}", session.id());

    state.session_started();
    let stats = session.run(Box::pin(client_frames(receiver))).await;
    state.session_finished();
    drop(session);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        warn!("Timed out flushing messages to the client");
    }

    debug!("Final session stats: {:?}", stats);
}

/// The only reader of the socket: text frames are control messages, binary
/// frames are audio. The stream ends when the client closes or errors.
fn client_frames(receiver: SplitStream<WebSocket>) -> impl Stream<Item = Inbound> + Send {
    receiver
        .take_while(|message| {
            let open = match message {
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    warn!("WebSocket error: {}", e);
                    false
                }
            };
            future::ready(open)
        })
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Inbound::Text(text)),
                Ok(Message::Binary(data)) => Some(Inbound::Binary(Bytes::from(data))),
                // Ping/Pong is handled automatically by axum
                _ => None,
            })
        })
}

/// Drain queued messages into the socket in order. Send failures are not
/// fatal: the next snapshot supersedes a lost one.
async fn write_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = outbound_rx.recv().await {
        match item {
            Outbound::Message(message) => {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(json)).await {
                    debug!("Failed to send message to client: {}", e);
                }
            }
            Outbound::Close => {
                if let Err(e) = sender.send(Message::Close(None)).await {
                    debug!("Client connection already closed: {}", e);
                }
                break;
            }
        }
    }
}
