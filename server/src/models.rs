//! Data models for Scroll Server

use chrono::{DateTime, Utc};
use scroll_core::{Chat, ChatSummary, Message, MessageKind, Participant};
use serde::{Deserialize, Serialize};

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: String, // "user" or "admin"
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

impl From<User> for Participant {
    fn from(user: User) -> Self {
        Self {
            id: user.user_id,
            name: user.name,
            email: user.email,
        }
    }
}

// ============================================================================
// Chat Models
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRow {
    pub chat_id: String,
    pub user_id: String,
    pub admin_id: String,
    pub last_message: String,
    pub last_message_type: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        Self {
            id: row.chat_id,
            user_id: row.user_id,
            admin_id: row.admin_id,
            last_message: row.last_message,
            last_message_type: row.last_message_type.parse().unwrap_or_default(),
            last_message_at: row.last_message_at,
            status: row.status.parse().unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Inbox row joined with the chat owner's profile.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatSummaryRow {
    #[sqlx(flatten)]
    pub chat: ChatRow,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

impl From<ChatSummaryRow> for ChatSummary {
    fn from(row: ChatSummaryRow) -> Self {
        let user = Participant {
            id: row.chat.user_id.clone(),
            name: row.user_name.unwrap_or_else(|| "Unknown user".to_string()),
            email: row.user_email.unwrap_or_default(),
        };

        Self {
            chat: row.chat.into(),
            user,
        }
    }
}

// ============================================================================
// Message Models
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub kind: String,       // "text" or "audio"
    pub content: Option<String>,
    pub audio_url: Option<String>,
    pub status: String,     // "sent", "delivered" or "read"
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        let kind: MessageKind = row.kind.parse().unwrap_or_default();
        let (content, audio_url) = match kind {
            MessageKind::Text => (row.content, None),
            MessageKind::Audio => (None, row.audio_url),
        };

        Self {
            id: row.message_id,
            chat_id: row.chat_id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            kind,
            content,
            audio_url,
            status: row.status.parse().unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ============================================================================
// API Request/Response Models
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatsResponse {
    pub chats: Vec<ChatSummary>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketQuery {
    pub user_id: Option<String>,
}
