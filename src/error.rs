//! Keyring Bot Error Types
//!
//! Error handling for the provider client, chat transport and configuration.
//! Pool administration never surfaces these; it reports `PoolOutcome`s.

use thiserror::Error;

/// Main error type for bot operations
#[derive(Debug, Error)]
pub enum BotError {
    /// Configuration errors (invalid JSON, missing fields, bad values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider answered with a non-success status
    #[error("Provider request failed with status {status}: {message}")]
    Provider { status: u16, message: String },

    /// Provider signalled a rate-limit or quota condition
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    /// A call did not finish within its time budget
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Chat transport (Telegram Bot API) failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP request failed before a response arrived
    #[error("Request failed: {0}")]
    Request(String),

    /// Response parsing failed or the response carried no usable content
    #[error("Response error: {0}")]
    Response(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Whether this error represents a rate-limit or quota condition
    pub fn is_rate_limited(&self) -> bool {
        match self {
            BotError::RateLimited(_) => true,
            BotError::Provider { status, message } => {
                crate::provider::rate_limit::is_rate_limit_error(*status, message)
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BotError::Timeout(err.to_string())
        } else if err.is_connect() {
            BotError::Request(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            BotError::Response(format!("Failed to decode response: {}", err))
        } else {
            BotError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Response(format!("JSON parsing error: {}", err))
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Config(format!("IO error: {}", err))
    }
}

/// Result type alias for bot operations
pub type Result<T> = std::result::Result<T, BotError>;
