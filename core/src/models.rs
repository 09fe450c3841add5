//! Data models for Scroll support chat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chat preview shown for audio messages
pub const VOICE_MESSAGE_PREVIEW: &str = "[Voice message]";

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Audio,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "audio" => Ok(MessageKind::Audio),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// Delivery status. Only ever advances `Sent` -> `Read`; `Delivered` is
/// reserved and never assigned by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// Payload of a message; text and audio reference are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Audio(String),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text(_) => MessageKind::Text,
            MessageBody::Audio(_) => MessageKind::Audio,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            MessageBody::Text(text) => Some(text),
            MessageBody::Audio(_) => None,
        }
    }

    pub fn audio_url(&self) -> Option<&str> {
        match self {
            MessageBody::Audio(url) => Some(url),
            MessageBody::Text(_) => None,
        }
    }

    /// Text stored in the chat's last-message preview
    pub fn preview(&self) -> String {
        match self {
            MessageBody::Text(text) => text.clone(),
            MessageBody::Audio(_) => VOICE_MESSAGE_PREVIEW.to_string(),
        }
    }
}

/// A persisted message as exposed over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub status: MessageStatus,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Rebuilds the typed body from the wire fields.
    pub fn body(&self) -> Option<MessageBody> {
        match self.kind {
            MessageKind::Text => self.content.clone().map(MessageBody::Text),
            MessageKind::Audio => self.audio_url.clone().map(MessageBody::Audio),
        }
    }
}

/// A validated message ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: MessageBody,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid message payload: missing {0}")]
    MissingField(&'static str),

    #[error("Message content is required")]
    EmptyText,

    #[error("Message content exceeds {0} characters")]
    TextTooLong(usize),

    #[error("Audio URL is required")]
    MissingAudio,
}

/// Inbound send request, as the client emits it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    /// Correlation id echoed back in the acknowledgement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl SendMessage {
    pub fn new(chat_id: &str, sender_id: &str, receiver_id: &str, body: MessageBody) -> Self {
        Self {
            request_id: None,
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            kind: body.kind(),
            content: body.content().map(str::to_string),
            audio_url: body.audio_url().map(str::to_string),
        }
    }

    /// Checks required fields and the payload for its kind. Text is trimmed;
    /// the payload field not matching the kind is discarded.
    pub fn validate(&self, max_text_len: usize) -> Result<NewMessage, ValidationError> {
        for (name, value) in [
            ("chatId", &self.chat_id),
            ("senderId", &self.sender_id),
            ("receiverId", &self.receiver_id),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(name));
            }
        }

        let body = match self.kind {
            MessageKind::Text => {
                let text = self.content.as_deref().map(str::trim).unwrap_or_default();
                if text.is_empty() {
                    return Err(ValidationError::EmptyText);
                }
                if text.chars().count() > max_text_len {
                    return Err(ValidationError::TextTooLong(max_text_len));
                }
                MessageBody::Text(text.to_string())
            }
            MessageKind::Audio => {
                let url = self.audio_url.as_deref().map(str::trim).unwrap_or_default();
                if url.is_empty() {
                    return Err(ValidationError::MissingAudio);
                }
                MessageBody::Audio(url.to_string())
            }
        };

        Ok(NewMessage {
            chat_id: self.chat_id.clone(),
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            body,
        })
    }
}

// ============================================================================
// Chats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    #[default]
    Open,
    Closed,
}

impl std::str::FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ChatStatus::Open),
            "closed" => Ok(ChatStatus::Closed),
            other => Err(format!("unknown chat status: {other}")),
        }
    }
}

/// One end-user <-> agent conversation with its denormalized preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub admin_id: String,
    pub last_message: String,
    pub last_message_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso8601::option")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub status: ChatStatus,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub updated_at: DateTime<Utc>,
}

/// Public profile of a chat participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Inbox row: the chat and the end-user who opened it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    pub user: Participant,
}

/// A chat together with its history, as returned when opening a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub chat: Chat,
    /// The assigned agent, if their account still exists
    #[serde(default)]
    pub admin: Option<Participant>,
    pub messages: Vec<Message>,
}

// ============================================================================
// Presence
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    pub user_id: String,
    pub online: bool,
}

/// Which side of the conversation is marking messages read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
    Admin,
    #[default]
    User,
}

/// ISO-8601 timestamps with millisecond precision, always UTC.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_str(&super::format(dt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn text(content: &str) -> SendMessage {
        SendMessage::new("c1", "u1", "a1", MessageBody::Text(content.to_string()))
    }

    #[test]
    fn test_text_is_trimmed() {
        let msg = text("  hello  ").validate(4000).unwrap();
        assert_eq!(msg.body, MessageBody::Text("hello".to_string()));
        assert_eq!(msg.body.preview(), "hello");
    }

    #[test]
    fn test_rejects_blank_text() {
        assert_eq!(text("   \n\t").validate(4000), Err(ValidationError::EmptyText));

        let mut missing = text("x");
        missing.content = None;
        assert_eq!(missing.validate(4000), Err(ValidationError::EmptyText));
    }

    #[test]
    fn test_rejects_long_text() {
        assert_eq!(text("abcdef").validate(5), Err(ValidationError::TextTooLong(5)));
        assert!(text("abcde").validate(5).is_ok());
    }

    #[test]
    fn test_audio_requires_reference() {
        let mut audio = SendMessage::new("c1", "u1", "a1", MessageBody::Audio(String::new()));
        assert_eq!(audio.validate(4000), Err(ValidationError::MissingAudio));

        audio.audio_url = Some("/uploads/voice.webm".to_string());
        audio.content = Some("ignored".to_string());
        let msg = audio.validate(4000).unwrap();
        assert_eq!(msg.body, MessageBody::Audio("/uploads/voice.webm".to_string()));
        assert_eq!(msg.body.preview(), VOICE_MESSAGE_PREVIEW);
    }

    #[test]
    fn test_missing_ids() {
        let mut msg = text("hi");
        msg.receiver_id = " ".to_string();
        assert_eq!(msg.validate(4000), Err(ValidationError::MissingField("receiverId")));
    }

    #[test]
    fn test_message_wire_shape() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let msg = Message {
            id: "m1".to_string(),
            chat_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            receiver_id: "a1".to_string(),
            kind: MessageKind::Text,
            content: Some("hello".to_string()),
            audio_url: None,
            status: MessageStatus::Sent,
            created_at: at,
            updated_at: at,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["_id"], "m1");
        assert_eq!(json["chatId"], "c1");
        assert_eq!(json["type"], "text");
        assert_eq!(json["status"], "sent");
        assert_eq!(json["createdAt"], "2024-03-01T12:30:00.000Z");
        assert!(json.get("audioUrl").is_none());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.body(), Some(MessageBody::Text("hello".to_string())));
    }

    #[test]
    fn test_chat_summary_wire_shape() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let summary = ChatSummary {
            chat: Chat {
                id: "c1".to_string(),
                user_id: "u1".to_string(),
                admin_id: "a1".to_string(),
                last_message: VOICE_MESSAGE_PREVIEW.to_string(),
                last_message_type: MessageKind::Audio,
                last_message_at: Some(at),
                status: ChatStatus::Open,
                created_at: at,
                updated_at: at,
            },
            user: Participant {
                id: "u1".to_string(),
                name: "Reader".to_string(),
                email: "reader@example.com".to_string(),
            },
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["_id"], "c1");
        assert_eq!(json["lastMessageType"], "audio");
        assert_eq!(json["user"]["_id"], "u1");
        assert_eq!(json["user"]["name"], "Reader");

        let back: ChatSummary = serde_json::from_value(json).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn test_send_message_defaults_missing_fields() {
        let msg: SendMessage = serde_json::from_str(r#"{"chatId":"c1","content":"hey"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.validate(4000), Err(ValidationError::MissingField("senderId")));
    }
}
