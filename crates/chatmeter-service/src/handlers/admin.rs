//! Admin control surface.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use chatmeter_core::{format_credits, AccountId, CreditAmount};

use crate::auth::AdminAuth;
use crate::engine::AdminStats;
use crate::error::ApiError;
use crate::handlers::accounts::AccountResponse;
use crate::handlers::credits::{requested_cents, TransactionResponse};
use crate::handlers::PageQuery;
use crate::state::AppState;

/// List users response.
#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    /// Accounts.
    pub users: Vec<AccountResponse>,
    /// Whether there are more accounts.
    pub has_more: bool,
}

/// List all accounts.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    let (users, has_more) =
        query.paginate(|limit, offset| state.engine.list_accounts(limit, offset))?;

    Ok(Json(ListUsersResponse {
        users: users.iter().map(AccountResponse::from).collect(),
        has_more,
    }))
}

/// Service statistics response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Totals.
    #[serde(flatten)]
    pub stats: AdminStats,
    /// Revenue formatted for display.
    pub total_revenue_formatted: String,
    /// Spend formatted for display.
    pub total_spent_formatted: String,
}

/// Service-wide totals.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.engine.stats()?;
    Ok(Json(StatsResponse {
        total_revenue_formatted: format_credits(stats.total_revenue_cents),
        total_spent_formatted: format_credits(stats.total_spent_cents),
        stats,
    }))
}

/// Admin action body. Only `add_credits` reads it.
#[derive(Debug, Default, Deserialize)]
pub struct UserActionRequest {
    /// Amount for `add_credits`, in credits.
    pub amount: Option<CreditAmount>,
    /// Amount for `add_credits`, in cents.
    pub amount_cents: Option<i64>,
}

/// Admin action response.
#[derive(Debug, Serialize)]
pub struct UserActionResponse {
    /// The action performed.
    pub action: String,
    /// The account after the action.
    pub user: AccountResponse,
    /// The ledger transaction, for `add_credits`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionResponse>,
}

/// Perform an action on a user: `toggle_status`, `reset_password` or
/// `add_credits`.
pub async fn user_action(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path((user_id, action)): Path<(String, String)>,
    body: Option<Json<UserActionRequest>>,
) -> Result<Json<UserActionResponse>, ApiError> {
    let account_id = user_id
        .parse::<AccountId>()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;
    let Json(body) = body.unwrap_or_default();

    tracing::info!(
        admin_id = %admin.admin_id,
        account_id = %account_id,
        action = %action,
        "Admin action"
    );

    let (account, transaction) = match action.as_str() {
        "toggle_status" => (state.engine.toggle_status(&account_id).await?, None),
        "reset_password" => {
            let account = state.engine.account(&account_id)?;
            state.identity.reset_password(&account_id).await?;
            (account, None)
        }
        "add_credits" => {
            let amount_cents = requested_cents(body.amount.as_ref(), body.amount_cents)?;
            let (account, tx) = state
                .engine
                .admin_add_credits(&account_id, amount_cents, &admin.admin_id)
                .await?;
            (account, Some(tx))
        }
        other => return Err(ApiError::BadRequest(format!("Unknown action: {other}"))),
    };

    Ok(Json(UserActionResponse {
        action,
        user: AccountResponse::from(&account),
        transaction: transaction.as_ref().map(TransactionResponse::from),
    }))
}
