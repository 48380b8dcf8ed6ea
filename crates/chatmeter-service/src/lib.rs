//! Chatmeter HTTP API service.
//!
//! This crate provides the metering engine and the HTTP API around it:
//!
//! - Accounts, balances and the credit ledger
//! - Subscription plans and hourly/monthly quotas
//! - The chat metering gateway
//! - Admin controls
//!
//! # Authentication
//!
//! 1. **Identity JWTs** - HS256 tokens issued by the identity service, `sub`
//!    carries the account ID
//! 2. **Admin API key** - `X-Admin-Key` for the admin routes (admin-role
//!    accounts may use their JWT instead)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod inference;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use engine::MeteringEngine;
pub use error::ApiError;
pub use identity::{HttpIdentityProvider, IdentityError, IdentityProvider, TokenGrant};
pub use inference::{HttpTokenCounter, NoTokenCounter, TokenCounter};
pub use routes::create_router;
pub use state::AppState;
