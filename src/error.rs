//! Crate-wide error taxonomy.
//!
//! Component-local error enums (`QueueError`, `StoreError`, `WorkerError`)
//! convert into `AppError` at the point where the supervisor, or a test,
//! needs to observe them uniformly. Data-path errors — a malformed input
//! line, a single failed insert — never reach this type; they are retried
//! or routed to the dead-letter path instead (see `worker::on_failure`).
//! Only the handful of kinds that should stop the process, or that the HTTP
//! layer renders as a response, live here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Config load, broker ping, or store ping failed at startup. Fatal: the
    /// process exits without serving traffic.
    #[error("fatal initialization error: {0}")]
    InitFatal(String),

    /// The consumer's broker client reported itself closed; unrecoverable
    /// without a restart.
    #[error("consumer terminated fatally: {0}")]
    FatalConsumer(String),

    /// Graceful shutdown did not complete before its deadline.
    #[error("shutdown timed out: {0}")]
    ShutdownTimeout(String),

    #[error(transparent)]
    Queue(#[from] crate::queue::QueueError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Worker(#[from] crate::worker::WorkerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The error envelope rendered to an HTTP client.
///
/// Only ever sent when the handler fails before the 202 response can be
/// written — a normally-formed request always gets 202, whatever happens
/// downstream of that.
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub http: HttpPart,
}

#[derive(Debug, serde::Serialize)]
pub struct HttpPart {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>, status: axum::http::StatusCode) -> Self {
        Self {
            message: message.into(),
            details: None,
            http: HttpPart {
                code: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Error").to_string(),
            },
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.http.code)
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self)).into_response()
    }
}
