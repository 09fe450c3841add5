//! Scroll Core Library
//!
//! Shared by the realtime gateway and its clients.
//! Provides: wire models, the event protocol, and a websocket chat client.

pub mod api;
pub mod client;
pub mod error;
pub mod models;
pub mod protocol;
pub mod typing;

use std::time::Duration;

pub use api::ApiClient;
pub use client::{ChatClient, SessionState};
pub use error::{Error, Result};
pub use models::*;
pub use protocol::{Ack, ClientEvent, ServerEvent};
pub use typing::{TypingDebouncer, TypingIndicator, TypingSignal, TYPING_IDLE};

/// Default endpoint path of the realtime gateway
pub const DEFAULT_WS_PATH: &str = "/api/socket";

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_host: String,
    pub server_port: u16,
    pub use_tls: bool,
    pub ws_path: String,
    /// Upper bound on waiting for a send acknowledgement
    pub ack_timeout: Duration,
}

impl ClientConfig {
    pub fn new(host: &str, port: u16, use_tls: bool) -> Self {
        Self {
            server_host: host.to_string(),
            server_port: port,
            use_tls,
            ws_path: DEFAULT_WS_PATH.to_string(),
            ack_timeout: Duration::from_secs(10),
        }
    }

    pub fn http_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.server_host, self.server_port)
    }

    pub fn ws_url(&self, user_id: &str) -> Result<url::Url> {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        let mut url = url::Url::parse(&format!(
            "{}://{}:{}{}",
            scheme, self.server_host, self.server_port, self.ws_path
        ))?;
        url.query_pairs_mut().append_pair("userId", user_id);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = ClientConfig::new("localhost", 3000, false);
        assert_eq!(config.http_url(), "http://localhost:3000");
        assert_eq!(
            config.ws_url("u 1").unwrap().as_str(),
            "ws://localhost:3000/api/socket?userId=u+1"
        );

        let tls = ClientConfig::new("chat.example.com", 443, true);
        assert!(tls.ws_url("u1").unwrap().as_str().starts_with("wss://chat.example.com/"));
    }
}
