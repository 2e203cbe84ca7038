//! Error types for tabletalk.
//!
//! The chat pipeline distinguishes expected, user-facing outcomes
//! (generation and execution failures, which the orchestrator folds into a
//! normal answer) from infrastructure faults that abort the request.

use std::time::Duration;
use thiserror::Error;

/// Failure kinds for the hosted completion service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The request exceeded the HTTP client timeout.
    #[error("completion request timed out")]
    Timeout,

    /// The service returned 429.
    #[error("completion service rate limited the request")]
    RateLimited,

    /// Credentials were rejected. Never retried.
    #[error("authentication with the completion service failed")]
    AuthFailure,

    /// Connection failures and 5xx responses.
    #[error("completion service unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Returns true if retrying the request may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::AuthFailure)
    }
}

/// The generation step produced no usable SQL statement.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The gateway call itself failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The completion arrived but contained no extractable statement.
    ///
    /// Carries the completion text so the caller can still surface the
    /// model's prose as a conversational reply.
    #[error("no SQL statement could be extracted from the completion")]
    NoStatement { completion: String },
}

/// The database rejected or failed a statement.
///
/// Carries the formatted database error message; surfaced verbatim to the
/// caller since the statement, not the system, is at fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Infrastructure faults that abort a chat request.
///
/// Everything else (rejected statements, failed queries, unusable
/// completions) is recovered into a normal answer by the orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The completion service rejected our credentials; no amount of
    /// further processing can produce an answer.
    #[error("authentication with the completion service failed")]
    AuthFailure,

    /// The per-request wall-clock budget was exhausted.
    #[error("request budget of {0:?} exhausted")]
    TimeoutExceeded(Duration),
}

/// Configuration errors (invalid config file, bad connection string, etc.)
#[derive(Error, Debug)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
