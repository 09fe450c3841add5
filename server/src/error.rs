//! Error types for Scroll Server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scroll_core::ValidationError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("No administrator available")]
    NoAdministrator,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NoAdministrator => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NO_ADMINISTRATOR",
                self.to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures inside the realtime path. These never reach the transport: they
/// become a negative acknowledgement or a log line.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Connection is not identified as {0}")]
    IdentityMismatch(String),

    #[error("Failed to persist: {0}")]
    Store(#[from] anyhow::Error),
}

impl GatewayError {
    /// Message reported to the originating client.
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Validation(e) => e.to_string(),
            GatewayError::IdentityMismatch(_) => "Sender ID mismatch".to_string(),
            GatewayError::Store(_) => "Failed to send message".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_not_leaked_to_clients() {
        let err = GatewayError::Store(anyhow::anyhow!("disk I/O error at /var/lib/scroll.db"));
        assert_eq!(err.client_message(), "Failed to send message");

        let err = GatewayError::from(ValidationError::EmptyText);
        assert_eq!(err.client_message(), "Message content is required");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::NotFound("Chat not found".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::NoAdministrator.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
