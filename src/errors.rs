use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure talking to the key-value backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("wrong value type stored at key {0}")]
    WrongType(String),

    #[error("backend reply mismatch: expected {expected} replies, got {actual}")]
    ReplyMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum RecordsError {
    #[error("{0}")]
    Validation(String),

    #[error("backend unavailable: {0}")]
    Backend(#[from] BackendError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Error shape returned by the HTTP routes.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "not found".to_string(),
        }
    }

    /// Map a service failure, logging the cause and hiding it from the client.
    pub fn from_records(err: RecordsError, what: &str) -> Self {
        match err {
            RecordsError::Validation(msg) => Self::bad_request(msg),
            RecordsError::Backend(e) => {
                tracing::error!("[{what}] failed: {e}");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: format!("failed to {}", what.replace('_', " ")),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
