//! Bot API error types

use std::time::Duration;
use thiserror::Error;

/// Transport error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Auth, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Forbidden, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unknown, message)
    }

    /// Classify a failed Bot API call from its HTTP status and error body
    pub fn from_api(status: u16, description: &str, retry_after: Option<u64>) -> Self {
        let err = match status {
            401 => Self::auth(format!("Authentication failed: {description}")),
            403 => Self::forbidden(format!("Forbidden: {description}")),
            409 => Self::new(
                TransportErrorKind::Conflict,
                format!("Conflict: {description}"),
            ),
            429 => Self::rate_limit(format!("Rate limited: {description}")),
            400 => Self::invalid_request(format!("Invalid request: {description}")),
            500..=599 => Self::server_error(format!("Server error: {description}")),
            _ => Self::unknown(format!("HTTP {status}: {description}")),
        };
        match retry_after {
            Some(secs) => err.with_retry_after(Duration::from_secs(secs)),
            None => err,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Error classification for the polling backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Network issues, timeouts - retryable
    Network,
    /// Flood control (429) - retryable after `retry_after`
    RateLimit,
    /// Server error (5xx) - retryable
    ServerError,
    /// Bad token (401) - not retryable
    Auth,
    /// The user blocked the bot or left the chat (403)
    Forbidden,
    /// Another consumer is polling or a webhook is set (409)
    Conflict,
    /// Bad request (400) - not retryable
    InvalidRequest,
    /// Unknown error
    Unknown,
}

impl TransportErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::RateLimit | Self::ServerError | Self::Conflict
        )
    }
}
