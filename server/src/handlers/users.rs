//! User presence handlers

use axum::{
    extract::{Path, State},
    Json,
};
use scroll_core::PresenceView;

use crate::AppState;

/// Whether the user currently has a live realtime connection
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<PresenceView> {
    let online = state.gateway.presence().is_online(&user_id);
    Json(PresenceView { user_id, online })
}
