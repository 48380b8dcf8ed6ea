//! Core types for chatmeter.
//!
//! This crate provides the domain types shared by the store, the metering
//! engine and the HTTP service:
//!
//! - **Identifiers**: `AccountId`, `TransactionId`, `ChatId`, `SubscriptionId`, `PlanId`
//! - **Accounts**: `Account`, `Role`, `AccountStatus`
//! - **Plans**: `Plan`, `Subscription`, `SubscriptionStatus`
//! - **Ledger**: `LedgerEntry`, `Transaction`, `TransactionType`
//! - **Usage**: `ChatUsageEvent`, `ChatStatistics`
//! - **Quota**: `QuotaWindowState`, `QuotaCheck`
//! - **Pricing**: `PricingConfig`, `ModelPricing`, `TokenEstimator`
//!
//! # Credit Unit
//!
//! Balances are `i64` credit cents: `1.00` credit is stored as `100`.
//! Display uses the `₮` glyph via [`format_credits`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod credits;
pub mod error;
pub mod ids;
pub mod plan;
pub mod pricing;
pub mod quota;
pub mod usage;

pub use account::{Account, AccountStatus, Role};
pub use credits::{
    format_credits, parse_credits, CreditAmount, LedgerEntry, Transaction, TransactionType,
    CREDIT_GLYPH,
};
pub use error::{MeteringError, RateLimitScope, Result};
pub use ids::{AccountId, ChatId, IdError, PlanId, SubscriptionId, TransactionId};
pub use plan::{Plan, Subscription, SubscriptionStatus};
pub use pricing::{ModelPricing, PricingConfig, TokenCounts, TokenEstimator, UnknownModelPolicy};
pub use quota::{hour_bucket, month_bucket, QuotaCheck, QuotaWindowState};
pub use usage::{ChatStatistics, ChatUsageEvent, ModelStats, TokenSource};
