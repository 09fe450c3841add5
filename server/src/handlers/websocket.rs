//! WebSocket handler for real-time communication

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use scroll_core::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;

use crate::{
    error::{AppError, Result},
    models::SocketQuery,
    AppState,
};

/// Upgrade to the realtime protocol. The handshake must name the user.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<SocketQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse> {
    let user_id = query
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(AppError::Unauthorized)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending events to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let Some(session) = state.gateway.connect(&user_id, tx) else {
        return;
    };

    // Task to forward events from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("Failed to encode server event: {}", e),
            }
        }
    });

    // Events from one connection are handled strictly in order
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => state.gateway.handle(&session, event).await,
                Err(e) => {
                    tracing::warn!("Failed to parse WebSocket message: {}", e);
                    state.gateway.hub().send_to(
                        session.conn,
                        ServerEvent::error("PARSE_ERROR", format!("Invalid message format: {}", e)),
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                // Binary frames are not part of the protocol; pings are answered by axum
            }
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
        }
    }

    state.gateway.disconnect(session).await;
    send_task.abort();
}
