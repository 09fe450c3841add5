//! Database storage layer for Scroll Server

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use scroll_core::{Chat, ChatSummary, Message, MessageKind, MessageStatus, NewMessage};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

use crate::models::*;

/// Persistence boundary used by the realtime gateway.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist a new message with status `sent`; the store assigns id and timestamps.
    async fn create_message(&self, message: &NewMessage) -> anyhow::Result<Message>;

    async fn update_chat_preview(
        &self,
        chat_id: &str,
        preview: &str,
        kind: MessageKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Flip `sent` -> `read` for messages in `chat_id` sent by `sender_id`.
    async fn bulk_mark_read(&self, chat_id: &str, sender_id: &str) -> anyhow::Result<u64>;

    async fn record_last_seen(&self, user_id: &str, at: DateTime<Utc>) -> anyhow::Result<()>;
}

/// Current time at the precision exposed over the wire.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        // Ensure directory exists
        if let Some(parent) = Path::new(database_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Private in-memory database; a single pinned connection keeps it alive.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL,
                last_seen_at TEXT
            );

            CREATE TABLE IF NOT EXISTS chats (
                chat_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                admin_id TEXT NOT NULL,
                last_message TEXT NOT NULL DEFAULT '',
                last_message_type TEXT NOT NULL DEFAULT 'text',
                last_message_at TEXT,
                status TEXT NOT NULL DEFAULT 'open',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE,
                FOREIGN KEY (admin_id) REFERENCES users(user_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL UNIQUE,
                chat_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                content TEXT,
                audio_url TEXT,
                status TEXT NOT NULL DEFAULT 'sent',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (chat_id) REFERENCES chats(chat_id) ON DELETE CASCADE
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_open_user
                ON chats(user_id) WHERE status = 'open';
            CREATE INDEX IF NOT EXISTS idx_chats_updated ON chats(updated_at);
            CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    pub async fn create_user(&self, name: &str, email: &str, role: Role) -> anyhow::Result<User> {
        let user = User {
            user_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            created_at: now(),
            last_seen_at: None,
        };

        sqlx::query(
            "INSERT INTO users (user_id, name, email, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.role)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, name, email, role, created_at, last_seen_at
             FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT user_id, name, email, role, created_at, last_seen_at
             FROM users ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// The earliest-created admin, who is assigned to new chats.
    async fn first_admin(&self) -> anyhow::Result<Option<User>> {
        let admin = sqlx::query_as::<_, User>(
            "SELECT user_id, name, email, role, created_at, last_seen_at
             FROM users WHERE role = 'admin' ORDER BY created_at ASC, rowid ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(admin)
    }

    // ========================================================================
    // Chat Operations
    // ========================================================================

    /// Return the user's open chat, creating it on first contact.
    ///
    /// `None` when a chat has to be created but no admin exists.
    pub async fn find_or_create_chat(&self, user_id: &str) -> anyhow::Result<Option<Chat>> {
        if let Some(chat) = self.open_chat_for(user_id).await? {
            return Ok(Some(chat));
        }

        let Some(admin) = self.first_admin().await? else {
            return Ok(None);
        };

        let created_at = now();
        // The partial unique index keeps a concurrent first contact from opening a second chat
        sqlx::query(
            "INSERT OR IGNORE INTO chats (chat_id, user_id, admin_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&admin.user_id)
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        self.open_chat_for(user_id).await
    }

    async fn open_chat_for(&self, user_id: &str) -> anyhow::Result<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT chat_id, user_id, admin_id, last_message, last_message_type, last_message_at,
                    status, created_at, updated_at
             FROM chats WHERE user_id = ? AND status = 'open'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Chat::from))
    }

    pub async fn get_chat(&self, chat_id: &str) -> anyhow::Result<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT chat_id, user_id, admin_id, last_message, last_message_type, last_message_at,
                    status, created_at, updated_at
             FROM chats WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Chat::from))
    }

    /// Admin inbox: every chat with its owner, most recently active first.
    pub async fn list_chats(&self) -> anyhow::Result<Vec<ChatSummary>> {
        let rows = sqlx::query_as::<_, ChatSummaryRow>(
            "SELECT c.chat_id, c.user_id, c.admin_id, c.last_message, c.last_message_type,
                    c.last_message_at, c.status, c.created_at, c.updated_at,
                    u.name AS user_name, u.email AS user_email
             FROM chats c LEFT JOIN users u ON u.user_id = c.user_id
             ORDER BY c.updated_at DESC, c.rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatSummary::from).collect())
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    pub async fn list_messages(&self, chat_id: &str) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT message_id, chat_id, sender_id, receiver_id, kind, content, audio_url,
                    status, created_at, updated_at
             FROM messages WHERE chat_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }
}

#[async_trait]
impl ChatStore for Storage {
    async fn create_message(&self, message: &NewMessage) -> anyhow::Result<Message> {
        let created_at = now();
        let row = MessageRow {
            message_id: uuid::Uuid::new_v4().to_string(),
            chat_id: message.chat_id.clone(),
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            kind: message.body.kind().to_string(),
            content: message.body.content().map(str::to_string),
            audio_url: message.body.audio_url().map(str::to_string),
            status: MessageStatus::Sent.to_string(),
            created_at,
            updated_at: created_at,
        };

        sqlx::query(
            "INSERT INTO messages
             (message_id, chat_id, sender_id, receiver_id, kind, content, audio_url, status,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.message_id)
        .bind(&row.chat_id)
        .bind(&row.sender_id)
        .bind(&row.receiver_id)
        .bind(&row.kind)
        .bind(&row.content)
        .bind(&row.audio_url)
        .bind(&row.status)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_chat_preview(
        &self,
        chat_id: &str,
        preview: &str,
        kind: MessageKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE chats
             SET last_message = ?, last_message_type = ?, last_message_at = ?, updated_at = ?
             WHERE chat_id = ?",
        )
        .bind(preview)
        .bind(kind.as_str())
        .bind(at)
        .bind(at)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn bulk_mark_read(&self, chat_id: &str, sender_id: &str) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET status = 'read', updated_at = ?
             WHERE chat_id = ? AND sender_id = ? AND status = 'sent'",
        )
        .bind(now())
        .bind(chat_id)
        .bind(sender_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn record_last_seen(&self, user_id: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_seen_at = ? WHERE user_id = ?")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll_core::{MessageBody, MessageStatus, VOICE_MESSAGE_PREVIEW};

    async fn seeded() -> (Storage, User, User) {
        let storage = Storage::in_memory().await.unwrap();
        let admin = storage
            .create_user("Agent", "agent@example.com", Role::Admin)
            .await
            .unwrap();
        let user = storage
            .create_user("Reader", "reader@example.com", Role::User)
            .await
            .unwrap();
        (storage, admin, user)
    }

    fn new_message(chat: &Chat, from: &str, to: &str, body: MessageBody) -> NewMessage {
        NewMessage {
            chat_id: chat.id.clone(),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            body,
        }
    }

    #[tokio::test]
    async fn test_find_or_create_chat_is_stable() {
        let (storage, admin, user) = seeded().await;

        let first = storage.find_or_create_chat(&user.user_id).await.unwrap().unwrap();
        assert_eq!(first.admin_id, admin.user_id);
        assert_eq!(first.last_message, "");

        let second = storage.find_or_create_chat(&user.user_id).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);

        let inbox = storage.list_chats().await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].chat.id, first.id);
        assert_eq!(inbox[0].user.id, user.user_id);
        assert_eq!(inbox[0].user.name, "Reader");
        assert_eq!(inbox[0].user.email, "reader@example.com");
    }

    #[tokio::test]
    async fn test_no_admin_means_no_chat() {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage
            .create_user("Reader", "reader@example.com", Role::User)
            .await
            .unwrap();

        assert!(storage.find_or_create_chat(&user.user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_message_and_preview() {
        let (storage, admin, user) = seeded().await;
        let chat = storage.find_or_create_chat(&user.user_id).await.unwrap().unwrap();

        let msg = storage
            .create_message(&new_message(
                &chat,
                &user.user_id,
                &admin.user_id,
                MessageBody::Text("hello".into()),
            ))
            .await
            .unwrap();
        assert_eq!(msg.status, MessageStatus::Sent);
        assert_eq!(msg.content.as_deref(), Some("hello"));
        assert!(msg.audio_url.is_none());

        let voice = storage
            .create_message(&new_message(
                &chat,
                &admin.user_id,
                &user.user_id,
                MessageBody::Audio("/uploads/a.webm".into()),
            ))
            .await
            .unwrap();
        storage
            .update_chat_preview(
                &chat.id,
                VOICE_MESSAGE_PREVIEW,
                MessageKind::Audio,
                voice.created_at,
            )
            .await
            .unwrap();

        let history = storage.list_messages(&chat.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, msg.id);
        assert_eq!(history[1].audio_url.as_deref(), Some("/uploads/a.webm"));
        assert!(history[1].content.is_none());

        let chat = storage.get_chat(&chat.id).await.unwrap().unwrap();
        assert_eq!(chat.last_message, VOICE_MESSAGE_PREVIEW);
        assert_eq!(chat.last_message_type, MessageKind::Audio);
        assert_eq!(chat.last_message_at, Some(voice.created_at));
    }

    #[tokio::test]
    async fn test_message_for_unknown_chat_fails() {
        let (storage, admin, user) = seeded().await;
        let result = storage
            .create_message(&NewMessage {
                chat_id: "missing".into(),
                sender_id: user.user_id.clone(),
                receiver_id: admin.user_id.clone(),
                body: MessageBody::Text("hi".into()),
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mark_read_only_counter_party_and_idempotent() {
        let (storage, admin, user) = seeded().await;
        let chat = storage.find_or_create_chat(&user.user_id).await.unwrap().unwrap();

        for text in ["one", "two"] {
            storage
                .create_message(&new_message(
                    &chat,
                    &user.user_id,
                    &admin.user_id,
                    MessageBody::Text(text.into()),
                ))
                .await
                .unwrap();
        }
        storage
            .create_message(&new_message(
                &chat,
                &admin.user_id,
                &user.user_id,
                MessageBody::Text("reply".into()),
            ))
            .await
            .unwrap();

        assert_eq!(storage.bulk_mark_read(&chat.id, &user.user_id).await.unwrap(), 2);
        assert_eq!(storage.bulk_mark_read(&chat.id, &user.user_id).await.unwrap(), 0);

        let history = storage.list_messages(&chat.id).await.unwrap();
        let statuses: Vec<_> = history.iter().map(|m| m.status).collect();
        assert_eq!(
            statuses,
            vec![MessageStatus::Read, MessageStatus::Read, MessageStatus::Sent]
        );
    }

    #[tokio::test]
    async fn test_record_last_seen() {
        let (storage, _admin, user) = seeded().await;
        assert!(user.last_seen_at.is_none());

        let at = now();
        storage.record_last_seen(&user.user_id, at).await.unwrap();

        let user = storage.get_user(&user.user_id).await.unwrap().unwrap();
        assert_eq!(user.last_seen_at, Some(at));
    }
}
