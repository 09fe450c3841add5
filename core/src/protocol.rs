//! Realtime event vocabulary exchanged over the chat socket
//!
//! Frames are JSON text: `{"type": "<event>", "payload": {...}}`.

use serde::{Deserialize, Serialize};

use crate::models::{Message, PresenceStatus, ReadSource, SendMessage};

/// Events emitted by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    UserOnline {
        #[serde(default)]
        user_id: String,
    },

    JoinChat {
        #[serde(default)]
        chat_id: String,
    },

    LeaveChat {
        #[serde(default)]
        chat_id: String,
    },

    TypingStart {
        #[serde(default)]
        chat_id: String,
        #[serde(default)]
        user_id: String,
    },

    TypingStop {
        #[serde(default)]
        chat_id: String,
        #[serde(default)]
        user_id: String,
    },

    SendMessage(SendMessage),

    /// `user_id` names the counter-party whose messages are being read.
    MarkRead {
        #[serde(default)]
        chat_id: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        source: ReadSource,
    },

    Ping,
}

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Connected {
        connection_id: u64,
        user_id: String,
    },

    UserStatus {
        user_id: String,
        status: PresenceStatus,
    },

    UserTyping {
        chat_id: String,
        user_id: String,
        is_typing: bool,
    },

    NewMessage(Message),

    MessagesRead {
        chat_id: String,
        sender_id: String,
        reader_id: String,
        count: u64,
    },

    Ack(Ack),

    Error {
        code: String,
        message: String,
    },

    Pong,
}

impl ServerEvent {
    pub fn typing(chat_id: &str, user_id: &str, is_typing: bool) -> Self {
        ServerEvent::UserTyping {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
            is_typing,
        }
    }

    pub fn status(user_id: &str, status: PresenceStatus) -> Self {
        ServerEvent::UserStatus {
            user_id: user_id.to_string(),
            status,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Direct reply to a `send_message`, correlated by `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub request_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn success(request_id: &str, message_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            ok: true,
            message_id: Some(message_id.to_string()),
            error: None,
        }
    }

    pub fn failure(request_id: &str, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            ok: false,
            message_id: None,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<String, String> {
        match (self.ok, self.message_id) {
            (true, Some(id)) => Ok(id),
            (true, None) => Err("acknowledgement without message id".to_string()),
            (false, _) => Err(self.error.unwrap_or_else(|| "Failed to send message".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_frames() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "typing_start",
            "payload": { "chatId": "c1", "userId": "u1" }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::TypingStart {
                chat_id: "c1".to_string(),
                user_id: "u1".to_string()
            }
        );

        let ping: ClientEvent = serde_json::from_value(json!({ "type": "ping" })).unwrap();
        assert_eq!(ping, ClientEvent::Ping);

        let read: ClientEvent = serde_json::from_value(json!({
            "type": "mark_read",
            "payload": { "chatId": "c1", "userId": "u1", "source": "admin" }
        }))
        .unwrap();
        assert!(matches!(read, ClientEvent::MarkRead { source: ReadSource::Admin, .. }));
    }

    #[test]
    fn test_missing_fields_deserialize_empty() {
        let event: ClientEvent =
            serde_json::from_value(json!({ "type": "join_chat", "payload": {} })).unwrap();
        assert_eq!(event, ClientEvent::JoinChat { chat_id: String::new() });
    }

    #[test]
    fn test_send_message_frame() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "send_message",
            "payload": {
                "requestId": "r-1",
                "chatId": "c1",
                "senderId": "u1",
                "receiverId": "a1",
                "type": "text",
                "content": "  hello  "
            }
        }))
        .unwrap();

        let ClientEvent::SendMessage(send) = event else {
            panic!("expected send_message");
        };
        assert_eq!(send.request_id.as_deref(), Some("r-1"));
        assert_eq!(send.content.as_deref(), Some("  hello  "));
    }

    #[test]
    fn test_server_event_frames() {
        let typing = serde_json::to_value(ServerEvent::typing("c1", "u1", false)).unwrap();
        assert_eq!(
            typing,
            json!({
                "type": "user_typing",
                "payload": { "chatId": "c1", "userId": "u1", "isTyping": false }
            })
        );

        let failure = Ack::failure("r-2", "Audio URL is required");
        let ack = serde_json::to_value(ServerEvent::Ack(failure)).unwrap();
        assert_eq!(ack["payload"]["ok"], false);
        assert_eq!(ack["payload"]["requestId"], "r-2");
        assert!(ack["payload"].get("messageId").is_none());
    }

    #[test]
    fn test_ack_into_result() {
        assert_eq!(Ack::success("r", "m1").into_result(), Ok("m1".to_string()));
        assert_eq!(
            Ack::failure("r", "boom").into_result(),
            Err("boom".to_string())
        );
    }
}
