//! Error types for feedstore
//!
//! All errors in the crate are converted to `AppError`. Recoverable
//! failures (timeouts, rollbacks) are turned into notifications by the
//! service layer; only caller mistakes and inline validation errors are
//! returned to the rendering layer.

use thiserror::Error;

use crate::service::HiddenReason;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404) or unknown to the local store
    #[error("Resource not found")]
    NotFound,

    /// Request rejected by the server (4xx other than 404)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Post exists but must not be shown
    #[error("{}", .0.message())]
    Hidden(HiddenReason),

    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Server-side failure (5xx)
    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    /// HTTP transport error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Response body could not be decoded into the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Timeout | AppError::Server { .. } => true,
            AppError::HttpClient(err) => {
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            _ => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Hidden(_) => "hidden",
            AppError::Timeout => "timeout",
            AppError::Server { .. } => "server",
            AppError::HttpClient(_) => "http_client",
            AppError::MalformedResponse(_) => "malformed_response",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Text suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound => "This post could not be found.".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Hidden(reason) => reason.message().to_string(),
            AppError::Timeout => "The request timed out. Please try again.".to_string(),
            AppError::Server { .. } | AppError::HttpClient(_) => {
                "Could not reach the server. Please try again.".to_string()
            }
            AppError::MalformedResponse(_) => {
                "Received an unexpected response from the server.".to_string()
            }
            AppError::Config(_) | AppError::Internal(_) => "Something went wrong.".to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedResponse(err.to_string())
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
