//! Chat directory handlers

use axum::{
    extract::{Path, State},
    Json,
};
use scroll_core::{ChatThread, Participant};

use crate::{
    error::{AppError, Result},
    models::*,
    AppState,
};

/// Open the end-user's support chat, creating it on first contact
pub async fn open_chat(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ChatThread>> {
    let user = state
        .storage
        .get_user(&user_id)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    if user.is_admin() {
        return Err(AppError::BadRequest("Administrators do not open support chats".to_string()));
    }

    let chat = state
        .storage
        .find_or_create_chat(&user.user_id)
        .await?
        .ok_or(AppError::NoAdministrator)?;

    let admin = state
        .storage
        .get_user(&chat.admin_id)
        .await?
        .map(Participant::from);
    let messages = state.storage.list_messages(&chat.id).await?;

    Ok(Json(ChatThread {
        chat,
        admin,
        messages,
    }))
}

/// All chats, most recently active first
pub async fn list_chats(State(state): State<AppState>) -> Result<Json<ChatsResponse>> {
    let chats = state.storage.list_chats().await?;
    Ok(Json(ChatsResponse { chats }))
}

/// Message history of one chat in creation order
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<MessagesResponse>> {
    if state.storage.get_chat(&chat_id).await?.is_none() {
        return Err(AppError::NotFound("Chat not found".to_string()));
    }

    let messages = state.storage.list_messages(&chat_id).await?;
    Ok(Json(MessagesResponse { messages }))
}
