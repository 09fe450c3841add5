//! Realtime chat client - the client half of the delivery protocol
//!
//! ```text
//! DISCONNECTED --connect--> CONNECTED --announce--> PRESENT
//! PRESENT --join_chat--> PRESENT
//! PRESENT --disconnect--> DISCONNECTED
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::error::{Error, Result};
use crate::models::{MessageBody, ReadSource, SendMessage};
use crate::protocol::{Ack, ClientEvent, ServerEvent};
use crate::typing::{TypingIndicator, TYPING_IDLE};
use crate::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Present,
}

type PendingAcks = Arc<Mutex<HashMap<String, oneshot::Sender<Ack>>>>;

pub struct ChatClient {
    user_id: String,
    ack_timeout: Duration,
    outgoing: mpsc::UnboundedSender<ClientEvent>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerEvent>>,
    pending: PendingAcks,
    state: Arc<Mutex<SessionState>>,
    rooms: Mutex<HashSet<String>>,
    next_request: AtomicU64,
    /// Tells the send task to close the socket
    shutdown: Option<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatClient {
    /// Open the socket; the handshake carries `user_id` as the connection identity.
    pub async fn connect(config: &ClientConfig, user_id: &str) -> Result<Self> {
        let url = config.ws_url(user_id)?;
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let pending: PendingAcks = Arc::new(Mutex::new(HashMap::new()));
        let state = Arc::new(Mutex::new(SessionState::Connected));

        let pending_clone = Arc::clone(&pending);
        let state_clone = Arc::clone(&state);

        // Receive task
        let recv_task = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(ServerEvent::Ack(ack)) => {
                            let waiter = pending_clone.lock().remove(&ack.request_id);
                            match waiter {
                                Some(tx) => {
                                    let _ = tx.send(ack);
                                }
                                None => log::debug!("late ack for {}", ack.request_id),
                            }
                        }
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("unparseable server frame: {}", e),
                    },
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *state_clone.lock() = SessionState::Disconnected;
            // Dropping the waiters fails every in-flight send
            pending_clone.lock().clear();
        });

        // Send task. Typing indicators hold their own senders, so the channel
        // closing is not enough to end it.
        let send_task = tokio::spawn(async move {
            loop {
                // Queued events go out before the close frame
                let event = tokio::select! {
                    biased;
                    event = out_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                    _ = &mut shutdown_rx => break,
                };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::error!("failed to encode client event: {}", e);
                        continue;
                    }
                };
                if write.send(WsMessage::Text(frame)).await.is_err() {
                    break;
                }
            }
            let _ = write.send(WsMessage::Close(None)).await;
        });

        log::info!("connected to {} as {}", config.server_host, user_id);

        Ok(Self {
            user_id: user_id.to_string(),
            ack_timeout: config.ack_timeout,
            outgoing: out_tx,
            events: tokio::sync::Mutex::new(event_rx),
            pending,
            state,
            rooms: Mutex::new(HashSet::new()),
            next_request: AtomicU64::new(1),
            shutdown: Some(shutdown_tx),
            tasks: vec![recv_task, send_task],
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.rooms.lock().iter().cloned().collect();
        rooms.sort();
        rooms
    }

    fn require(&self, expected: SessionState) -> Result<()> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::InvalidState { expected, actual })
        }
    }

    fn emit(&self, event: ClientEvent) -> Result<()> {
        self.outgoing.send(event).map_err(|_| Error::Disconnected)
    }

    /// Announce presence. Idempotent once present.
    pub fn announce(&self) -> Result<()> {
        if self.state() == SessionState::Present {
            return Ok(());
        }
        self.require(SessionState::Connected)?;
        self.emit(ClientEvent::UserOnline {
            user_id: self.user_id.clone(),
        })?;
        *self.state.lock() = SessionState::Present;
        Ok(())
    }

    /// Subscribe to a chat's room. Joining a room twice is a no-op.
    pub fn join_chat(&self, chat_id: &str) -> Result<()> {
        self.require(SessionState::Present)?;
        if !self.rooms.lock().insert(chat_id.to_string()) {
            return Ok(());
        }
        self.emit(ClientEvent::JoinChat {
            chat_id: chat_id.to_string(),
        })
    }

    pub fn leave_chat(&self, chat_id: &str) -> Result<()> {
        self.require(SessionState::Present)?;
        if !self.rooms.lock().remove(chat_id) {
            return Ok(());
        }
        self.emit(ClientEvent::LeaveChat {
            chat_id: chat_id.to_string(),
        })
    }

    pub fn typing_start(&self, chat_id: &str) -> Result<()> {
        self.require(SessionState::Present)?;
        self.emit(ClientEvent::TypingStart {
            chat_id: chat_id.to_string(),
            user_id: self.user_id.clone(),
        })
    }

    pub fn typing_stop(&self, chat_id: &str) -> Result<()> {
        self.require(SessionState::Present)?;
        self.emit(ClientEvent::TypingStop {
            chat_id: chat_id.to_string(),
            user_id: self.user_id.clone(),
        })
    }

    /// Debounced typing for an input box bound to `chat_id`.
    pub fn typing_indicator(&self, chat_id: &str) -> Result<TypingIndicator> {
        self.require(SessionState::Present)?;
        Ok(TypingIndicator::spawn(
            chat_id.to_string(),
            self.user_id.clone(),
            TYPING_IDLE,
            self.outgoing.clone(),
        ))
    }

    /// Send a message and wait for its acknowledgement.
    ///
    /// Returns the persisted message id. Invalid payloads are rejected locally
    /// without touching the socket.
    pub async fn send_message(
        &self,
        chat_id: &str,
        receiver_id: &str,
        body: MessageBody,
    ) -> Result<String> {
        self.require(SessionState::Present)?;

        let mut request = SendMessage::new(chat_id, &self.user_id, receiver_id, body);
        request.validate(usize::MAX)?;

        let request_id = format!(
            "{}-{}",
            self.user_id,
            self.next_request.fetch_add(1, Ordering::Relaxed)
        );
        request.request_id = Some(request_id.clone());

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        if let Err(e) = self.emit(ClientEvent::SendMessage(request)) {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(ack)) => ack.into_result().map_err(Error::Rejected),
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(Error::AckTimeout(request_id))
            }
        }
    }

    /// Mark the counter-party's messages in `chat_id` as read.
    pub fn mark_read(&self, chat_id: &str, sender_id: &str, source: ReadSource) -> Result<()> {
        self.require(SessionState::Present)?;
        self.emit(ClientEvent::MarkRead {
            chat_id: chat_id.to_string(),
            user_id: sender_id.to_string(),
            source,
        })
    }

    pub fn ping(&self) -> Result<()> {
        self.emit(ClientEvent::Ping)
    }

    /// Next broadcast or error pushed by the server; `None` once the connection is gone.
    pub async fn next_event(&self) -> Option<ServerEvent> {
        self.events.lock().await.recv().await
    }

    /// Close the connection. Terminal: the client cannot reconnect.
    pub async fn disconnect(mut self) {
        *self.state.lock() = SessionState::Disconnected;
        self.rooms.lock().clear();

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        let tasks = std::mem::take(&mut self.tasks);
        drop(self);
        for mut task in tasks {
            if tokio::time::timeout(Duration::from_secs(2), &mut task).await.is_err() {
                log::warn!("connection task did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
