//! Error types for chatmeter.
//!
//! Every variant is a condition the caller can act on. None of them mean the
//! engine is broken, and none of them leave a half-applied charge behind.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::IdError;

/// Result type for chatmeter operations.
pub type Result<T> = std::result::Result<T, MeteringError>;

/// Which quota window rejected a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// Too many chats in the current UTC hour.
    Hourly,
    /// Too many tokens in the current UTC calendar month.
    Monthly,
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hourly => f.write_str("hourly"),
            Self::Monthly => f.write_str("monthly"),
        }
    }
}

/// Errors produced by the ledger, quota and metering components.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeteringError {
    /// The account exists but is not `active`.
    #[error("account is not active")]
    AccountInactive,

    /// The account holds no active subscription.
    #[error("no active subscription")]
    NoSubscription,

    /// A quota window is exhausted.
    #[error("rate limit exceeded: {scope} quota exhausted")]
    RateLimited {
        /// The exhausted window.
        scope: RateLimitScope,
    },

    /// The model is VIP-only (or unknown under the reject policy).
    #[error("model not permitted: {model}")]
    ModelNotPermitted {
        /// The requested model name.
        model: String,
    },

    /// Pricing produced a non-positive cost. This is a configuration fault.
    #[error("pricing error: {0}")]
    PricingError(String),

    /// The balance cannot cover the charge.
    #[error("insufficient credit: balance={balance}, required={required}")]
    InsufficientCredit {
        /// Current balance in cents.
        balance: i64,
        /// Required amount in cents.
        required: i64,
    },

    /// A credit or debit amount was not strictly positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A plan, account, chat or subscription does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The backing store failed. Transient; the caller should retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl MeteringError {
    /// Machine-readable reason code, stable across releases.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::AccountInactive => "account_inactive",
            Self::NoSubscription => "no_subscription",
            Self::RateLimited { .. } => "rate_limited",
            Self::ModelNotPermitted { .. } => "model_not_permitted",
            Self::PricingError(_) => "pricing_error",
            Self::InsufficientCredit { .. } => "insufficient_credit",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::NotFound { .. } => "not_found",
            Self::Unavailable(_) => "store_unavailable",
            Self::InvalidId(_) => "invalid_id",
        }
    }

    /// Whether retrying the same request may succeed without any change.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_snake_case_codes() {
        let err = MeteringError::RateLimited {
            scope: RateLimitScope::Monthly,
        };
        assert_eq!(err.reason(), "rate_limited");
        assert_eq!(err.to_string(), "rate limit exceeded: monthly quota exhausted");
        assert_eq!(
            MeteringError::InsufficientCredit {
                balance: 100,
                required: 150
            }
            .reason(),
            "insufficient_credit"
        );
    }

    #[test]
    fn only_store_failures_are_transient() {
        assert!(MeteringError::Unavailable("io".into()).is_transient());
        assert!(!MeteringError::InsufficientCredit {
            balance: 0,
            required: 1
        }
        .is_transient());
    }

    #[test]
    fn not_found_message() {
        let err = MeteringError::not_found("plan", 9);
        assert_eq!(err.to_string(), "plan not found: 9");
    }
}
