//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/chat`  send one message, get both replies as a JSON array
//! - `GET  /v1/ws`    WebSocket speaking the chat frame protocol

use axum::{
    Router,
    extract::State,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use defibot_core::protocol::{InboundMessage, OutboundMessage};

use crate::SharedState;

/// Outbound frames buffered per connection before handlers wait.
const OUTBOUND_BUFFER: usize = 32;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

/// `POST /v1/chat`: run one request on a fresh session and return every
/// frame it produced, quick reply first.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Vec<OutboundMessage>>, StatusCode> {
    if request.message.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let session = state.orchestrator.new_session();
    let (tx, mut rx) = mpsc::channel(4);
    state
        .orchestrator
        .handle(&session, &request.message, &tx)
        .await;
    drop(tx);

    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    Ok(Json(frames))
}

/// `GET /v1/ws`
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Each chat frame is handled in its own task, so replies to different
/// requests on one connection may interleave. A single writer task owns
/// the socket's send half.
async fn handle_ws_connection(socket: WebSocket, state: SharedState) {
    info!("WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_BUFFER);

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if sender.send(WsMessage::Text(json.into())).await.is_err() {
                debug!("WebSocket send failed; closing writer");
                break;
            }
        }
    });

    let session = Arc::new(state.orchestrator.new_session());

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue, // ignore binary, ping, pong
            Err(_) => break,
        };

        match InboundMessage::parse(&text) {
            Ok(InboundMessage::Chat { content }) => {
                let orchestrator = state.orchestrator.clone();
                let session = session.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    orchestrator.handle(&session, &content, &tx).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "Rejected client frame");
                if tx.send(OutboundMessage::error(e.to_string())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("WebSocket connection closed");
}
