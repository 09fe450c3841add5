//! Realtime session gateway
//!
//! Dispatches inbound client events to the presence and typing trackers and
//! the chat store, then fans results out through the connection hub. Each
//! connection's events are handled one at a time by its socket task; events
//! from different connections interleave at store awaits.

use std::sync::Arc;

use scroll_core::{
    Ack, ClientEvent, Message, PresenceStatus, ReadSource, SendMessage, ServerEvent,
};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::presence::PresenceTracker;
use crate::storage::{self, ChatStore};
use crate::typing::TypingTracker;
use crate::websocket::{ConnectionHub, ConnectionId};

/// State of one client connection, owned by its socket task.
#[derive(Debug)]
pub struct Session {
    pub conn: ConnectionId,
    /// Identity from the handshake
    pub user_id: String,
}

pub struct Gateway {
    store: Arc<dyn ChatStore>,
    presence: Arc<dyn PresenceTracker>,
    typing: Arc<dyn TypingTracker>,
    hub: Arc<ConnectionHub>,
    max_text_len: usize,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn ChatStore>,
        presence: Arc<dyn PresenceTracker>,
        typing: Arc<dyn TypingTracker>,
        hub: Arc<ConnectionHub>,
        max_text_len: usize,
    ) -> Self {
        Self {
            store,
            presence,
            typing,
            hub,
            max_text_len,
        }
    }

    pub fn presence(&self) -> &dyn PresenceTracker {
        self.presence.as_ref()
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    /// Register a connection. Returns `None` when the handshake carries no identity.
    pub fn connect(
        &self,
        user_id: &str,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Option<Session> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return None;
        }

        let conn = self.hub.register(user_id, sender);
        self.hub.send_to(
            conn,
            ServerEvent::Connected {
                connection_id: conn.0,
                user_id: user_id.to_string(),
            },
        );

        Some(Session {
            conn,
            user_id: user_id.to_string(),
        })
    }

    pub async fn handle(&self, session: &Session, event: ClientEvent) {
        match event {
            ClientEvent::UserOnline { user_id } => self.announce(session, &user_id),

            ClientEvent::JoinChat { chat_id } => {
                if chat_id.is_empty() {
                    return;
                }
                if self.hub.join(session.conn, &chat_id) {
                    tracing::debug!("{} joined chat {}", session.conn, chat_id);
                }
            }

            ClientEvent::LeaveChat { chat_id } => {
                if !chat_id.is_empty() {
                    self.hub.leave(session.conn, &chat_id);
                }
            }

            ClientEvent::TypingStart { chat_id, user_id } => {
                self.set_typing(session, &chat_id, &user_id, true)
            }

            ClientEvent::TypingStop { chat_id, user_id } => {
                self.set_typing(session, &chat_id, &user_id, false)
            }

            ClientEvent::SendMessage(request) => {
                let request_id = request.request_id.clone();
                let result = self.send_message(session, request).await;

                if let Err(e) = &result {
                    tracing::warn!("send_message from {} rejected: {}", session.user_id, e);
                }

                let reply = match (request_id, result) {
                    (Some(id), Ok(message)) => {
                        Some(ServerEvent::Ack(Ack::success(&id, &message.id)))
                    }
                    (Some(id), Err(e)) => {
                        Some(ServerEvent::Ack(Ack::failure(&id, e.client_message())))
                    }
                    (None, Ok(_)) => None,
                    (None, Err(e)) => Some(ServerEvent::error("SEND_FAILED", e.client_message())),
                };
                if let Some(reply) = reply {
                    self.hub.send_to(session.conn, reply);
                }
            }

            ClientEvent::MarkRead {
                chat_id,
                user_id,
                source,
            } => {
                if let Err(e) = self.mark_read(session, &chat_id, &user_id, source).await {
                    tracing::error!("mark_read on chat {} failed: {}", chat_id, e);
                }
            }

            ClientEvent::Ping => self.hub.send_to(session.conn, ServerEvent::Pong),
        }
    }

    fn announce(&self, session: &Session, user_id: &str) {
        if user_id.is_empty() {
            return;
        }
        if user_id != session.user_id {
            tracing::warn!(
                "{} announced as {} but connected as {}",
                session.conn,
                user_id,
                session.user_id
            );
            return;
        }

        if self.presence.mark_online(user_id, session.conn) {
            self.hub.broadcast_except(
                session.conn,
                ServerEvent::status(user_id, PresenceStatus::Online),
            );
            tracing::info!("User {} is now online", user_id);
        }
    }

    fn set_typing(&self, session: &Session, chat_id: &str, user_id: &str, is_typing: bool) {
        if chat_id.is_empty() || user_id.is_empty() {
            return;
        }
        if user_id != session.user_id {
            tracing::warn!("{} sent typing for {}", session.conn, user_id);
            return;
        }

        let changed = if is_typing {
            self.typing.start(chat_id, user_id)
        } else {
            self.typing.stop(chat_id, user_id)
        };

        if changed {
            self.hub.broadcast_to_room_except(
                chat_id,
                session.conn,
                ServerEvent::typing(chat_id, user_id, is_typing),
            );
        }
    }

    /// Validate, persist, update the chat preview, and broadcast to the room.
    pub async fn send_message(
        &self,
        session: &Session,
        request: SendMessage,
    ) -> Result<Message, GatewayError> {
        let new_message = request.validate(self.max_text_len)?;
        if new_message.sender_id != session.user_id {
            return Err(GatewayError::IdentityMismatch(new_message.sender_id));
        }

        let chat_id = new_message.chat_id.as_str();
        if self.typing.stop(chat_id, &new_message.sender_id) {
            self.hub.broadcast_to_room_except(
                chat_id,
                session.conn,
                ServerEvent::typing(chat_id, &new_message.sender_id, false),
            );
        }

        let message = self.store.create_message(&new_message).await?;

        // The message is already durable; a stale preview is not worth failing the send
        if let Err(e) = self
            .store
            .update_chat_preview(
                chat_id,
                &new_message.body.preview(),
                new_message.body.kind(),
                message.created_at,
            )
            .await
        {
            tracing::error!("Failed to update preview of chat {}: {:#}", chat_id, e);
        }

        self.hub
            .broadcast_to_room(chat_id, ServerEvent::NewMessage(message.clone()));

        Ok(message)
    }

    /// Mark `sender_id`'s messages in `chat_id` read. Only the admin side
    /// broadcasts a receipt.
    pub async fn mark_read(
        &self,
        session: &Session,
        chat_id: &str,
        sender_id: &str,
        source: ReadSource,
    ) -> Result<u64, GatewayError> {
        if chat_id.is_empty() || sender_id.is_empty() {
            return Ok(0);
        }
        if sender_id == session.user_id {
            tracing::warn!(
                "{} tried to mark its own messages read in {}",
                session.user_id,
                chat_id
            );
            return Ok(0);
        }

        let count = self.store.bulk_mark_read(chat_id, sender_id).await?;
        tracing::debug!("Marked {} messages read in chat {}", count, chat_id);

        if source == ReadSource::Admin {
            self.hub.broadcast_to_room(
                chat_id,
                ServerEvent::MessagesRead {
                    chat_id: chat_id.to_string(),
                    sender_id: sender_id.to_string(),
                    reader_id: session.user_id.clone(),
                    count,
                },
            );
        }

        Ok(count)
    }

    /// Tear down a connection: presence, typing cleanup, then last-seen.
    ///
    /// Every tracker update and broadcast happens before the store write, so
    /// a tab that reconnects while last-seen is pending is never overtaken by
    /// a stale offline or typing-stop event.
    pub async fn disconnect(&self, session: Session) {
        let departure = self.presence.mark_offline(session.conn);

        if let Some(departure) = departure.as_ref().filter(|d| d.last) {
            self.hub.broadcast_except(
                session.conn,
                ServerEvent::status(&departure.user_id, PresenceStatus::Offline),
            );
            tracing::info!("User {} is now offline", departure.user_id);
        }

        for chat_id in self.typing.clear_user(&session.user_id) {
            self.hub.broadcast_to_room_except(
                &chat_id,
                session.conn,
                ServerEvent::typing(&chat_id, &session.user_id, false),
            );
        }

        self.hub.unregister(session.conn);

        if let Some(departure) = departure.filter(|d| d.last) {
            if let Err(e) = self
                .store
                .record_last_seen(&departure.user_id, storage::now())
                .await
            {
                tracing::error!("Failed to record last seen for {}: {:#}", departure.user_id, e);
            }
        }
    }
}
