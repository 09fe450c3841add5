//! HTTP API client for chat history and presence lookups

use reqwest::{Client, StatusCode};

use crate::error::{Error, Result};
use crate::models::{ChatSummary, ChatThread, Message, PresenceView};
use crate::ClientConfig;

#[derive(serde::Deserialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

#[derive(serde::Deserialize)]
struct ChatsResponse {
    chats: Vec<ChatSummary>,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.ack_timeout).build()?;

        Ok(Self {
            client,
            base_url: config.http_url(),
        })
    }

    /// Find or create the end-user's support chat, with its history.
    pub async fn open_chat(&self, user_id: &str) -> Result<ChatThread> {
        let resp = self
            .client
            .post(format!("{}/api/v1/users/{}/chat", self.base_url, user_id))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "opening chat for {} failed with {}",
                user_id,
                resp.status()
            )));
        }

        Ok(resp.json().await?)
    }

    /// All chats with their owners, most recently active first.
    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        let resp = self
            .client
            .get(format!("{}/api/v1/chats", self.base_url))
            .send()
            .await?
            .error_for_status()?;

        let data: ChatsResponse = resp.json().await?;
        Ok(data.chats)
    }

    pub async fn chat_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let resp = self
            .client
            .get(format!("{}/api/v1/chats/{}/messages", self.base_url, chat_id))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(chat_id.to_string()));
        }

        let data: MessagesResponse = resp.error_for_status()?.json().await?;
        Ok(data.messages)
    }

    pub async fn is_online(&self, user_id: &str) -> Result<bool> {
        let resp = self
            .client
            .get(format!("{}/api/v1/users/{}/presence", self.base_url, user_id))
            .send()
            .await?
            .error_for_status()?;

        let view: PresenceView = resp.json().await?;
        Ok(view.online)
    }
}
