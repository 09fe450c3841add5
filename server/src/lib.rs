//! Scroll Server - realtime support chat gateway
//!
//! This crate handles:
//! - Presence tracking across multiple tabs per user
//! - Per-chat rooms with typing indicators
//! - Message delivery with acknowledgements and read receipts
//! - Chat history persistence in SQLite

pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod presence;
pub mod storage;
pub mod typing;
pub mod websocket;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::gateway::Gateway;
use crate::presence::InMemoryPresence;
use crate::storage::Storage;
use crate::typing::InMemoryTyping;
use crate::websocket::ConnectionHub;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<Storage>,
    pub gateway: Arc<Gateway>,
}

impl AppState {
    /// Wire the gateway to the given storage with single-process trackers.
    pub fn new(config: Arc<Config>, storage: Arc<Storage>) -> Self {
        let gateway = Gateway::new(
            storage.clone(),
            Arc::new(InMemoryPresence::new()),
            Arc::new(InMemoryTyping::new()),
            Arc::new(ConnectionHub::new()),
            config.realtime.max_text_len,
        );

        Self {
            config,
            storage,
            gateway: Arc::new(gateway),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let ws_path = state.config.server.ws_path.clone();

    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))

        // Chat directory
        .route("/api/v1/chats", get(handlers::chats::list_chats))
        .route("/api/v1/chats/:chat_id/messages", get(handlers::chats::get_messages))
        .route("/api/v1/users/:user_id/chat", post(handlers::chats::open_chat))

        // Presence
        .route("/api/v1/users/:user_id/presence", get(handlers::users::get_presence))

        // WebSocket for real-time communication
        .route(&ws_path, get(handlers::websocket::websocket_handler))

        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
