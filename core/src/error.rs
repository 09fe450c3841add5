//! Error types for Scroll Core

use thiserror::Error;

use crate::client::SessionState;
use crate::models::ValidationError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    #[error("Operation requires a {expected:?} session, current state is {actual:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    #[error("No acknowledgement for request {0}")]
    AckTimeout(String),

    #[error("Server rejected message: {0}")]
    Rejected(String),

    #[error("Connection closed")]
    Disconnected,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(e.to_string())
    }
}
