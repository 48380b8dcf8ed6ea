//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, chats, credits, health, subscriptions, token};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for the chat metering endpoint.
const CHAT_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /token` - Exchange credentials for a token (identity service)
/// - `GET /subscription-plans`, `GET /subscription-plans/:id` - Plan catalog
///
/// ## Users (JWT auth)
/// - `POST /accounts` - Register the ledger account
/// - `GET|PUT /users/me` - Profile
/// - `POST /users/me/add-credits` - Top up
/// - `GET /users/me/transactions` - Ledger history
/// - `GET /users/me/rate-limit-status`, `GET /users/me/chat-statistics`
/// - `GET /users/me/subscription[/usage|/status|/history]`
/// - `POST /subscribe` - Buy a plan
/// - `GET /models` - Models available to the caller
///
/// ## Chats (JWT auth, own concurrency limit)
/// - `POST /chats` - Meter a chat
/// - `GET /chats`, `GET /chats/:id` - Chat history
///
/// ## Admin (admin key or admin-role JWT)
/// - `POST /subscription-plans` - Create or replace a plan
/// - `GET /admin/users`, `GET /admin/stats`
/// - `POST /admin/users/:id/:action` - `toggle_status`, `reset_password`, `add_credits`
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let chat_routes = Router::new()
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route("/chats/:id", get(chats::get_chat))
        .layer(ConcurrencyLimitLayer::new(CHAT_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .route("/token", post(token::issue_token))
        .route("/accounts", post(accounts::create_account))
        // Current user
        .route("/users/me", get(accounts::get_me).put(accounts::update_me))
        .route("/users/me/add-credits", post(accounts::add_credits))
        .route("/users/me/transactions", get(credits::list_transactions))
        .route("/users/me/rate-limit-status", get(chats::rate_limit_status))
        .route("/users/me/chat-statistics", get(chats::chat_statistics))
        .route(
            "/users/me/subscription",
            get(subscriptions::current_subscription),
        )
        .route(
            "/users/me/subscription/usage",
            get(subscriptions::subscription_usage),
        )
        .route(
            "/users/me/subscription/status",
            get(subscriptions::subscription_status),
        )
        .route(
            "/users/me/subscription/history",
            get(subscriptions::subscription_history),
        )
        // Plans
        .route(
            "/subscription-plans",
            get(subscriptions::list_plans).post(subscriptions::upsert_plan),
        )
        .route("/subscription-plans/:id", get(subscriptions::get_plan))
        .route("/subscribe", post(subscriptions::subscribe))
        .route("/models", get(chats::list_models))
        // Admin
        .route("/admin/users", get(admin::list_users))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/users/:id/:action", post(admin::user_action))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .merge(chat_routes)
        .merge(api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
