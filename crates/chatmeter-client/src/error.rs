//! Client error types.

use chatmeter_core::RateLimitScope;

/// Errors that can occur when using the chatmeter client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The balance does not cover the charge.
    #[error("insufficient credit: balance={balance}, required={required}")]
    InsufficientCredit {
        /// Current balance in cents.
        balance: i64,
        /// Required amount in cents.
        required: i64,
    },

    /// A quota window is exhausted.
    #[error("rate limited: {scope} quota exhausted")]
    RateLimited {
        /// The exhausted window.
        scope: RateLimitScope,
    },

    /// Missing or rejected credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// The server's error code, if this came from an error response.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            Self::InsufficientCredit { .. } => Some("insufficient_credit"),
            Self::RateLimited { .. } => Some("rate_limited"),
            Self::Unauthorized => Some("unauthorized"),
            _ => None,
        }
    }
}
