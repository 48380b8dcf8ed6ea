//! Account and profile handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use chatmeter_core::{
    format_credits, Account, AccountStatus, CreditAmount, Role, TransactionType,
};

use crate::auth::AuthUser;
use crate::engine::Registration;
use crate::error::ApiError;
use crate::handlers::credits::{requested_cents, TransactionResponse};
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Account ID.
    pub id: String,
    /// Display name.
    pub username: String,
    /// Contact email.
    pub email: Option<String>,
    /// Current balance in cents.
    pub balance_cents: i64,
    /// Balance formatted for display.
    pub balance_formatted: String,
    /// Access role.
    pub role: Role,
    /// Lifecycle status.
    pub status: AccountStatus,
    /// Current subscription ID, if any.
    pub current_subscription: Option<String>,
    /// Lifetime deposits in cents.
    pub lifetime_deposited_cents: i64,
    /// Lifetime spend in cents.
    pub lifetime_spent_cents: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            username: account.username.clone(),
            email: account.email.clone(),
            balance_cents: account.balance_cents,
            balance_formatted: format_credits(account.balance_cents),
            role: account.role,
            status: account.status,
            current_subscription: account.current_subscription.map(|id| id.to_string()),
            lifetime_deposited_cents: account.lifetime_deposited_cents,
            lifetime_spent_cents: account.lifetime_spent_cents,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create account request. Fields default to the token claims.
#[derive(Debug, Default, Deserialize)]
pub struct CreateAccountRequest {
    /// Display name.
    pub username: Option<String>,
    /// Contact email.
    pub email: Option<String>,
}

/// Register the ledger account for the authenticated identity.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: Option<Json<CreateAccountRequest>>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let Json(body) = body.unwrap_or_default();

    let username = body
        .username
        .or(auth.username)
        .unwrap_or_else(|| format!("user-{}", auth.account_id));
    let mut account = Account::new(auth.account_id, username).with_role(auth.role);
    account.email = body.email.or(auth.email);

    match state.engine.register(account).await? {
        Registration::Created(account) => {
            Ok((StatusCode::CREATED, Json(AccountResponse::from(&account))))
        }
        Registration::Existing(_) => Err(ApiError::Conflict("Account already exists".into())),
    }
}

/// Get the current user's account.
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.engine.account(&auth.account_id)?;
    Ok(Json(AccountResponse::from(&account)))
}

/// Profile update request.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    /// New display name.
    pub username: Option<String>,
    /// New contact email.
    pub email: Option<String>,
}

/// Update the current user's profile.
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    if body.username.as_deref().is_some_and(|u| u.trim().is_empty()) {
        return Err(ApiError::BadRequest("username must not be empty".into()));
    }

    let account = state
        .engine
        .update_profile(&auth.account_id, body.username, body.email)
        .await?;
    Ok(Json(AccountResponse::from(&account)))
}

/// Add credits request: `{"amount": 10.5}` or `{"amount_cents": 1050}`.
#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    /// Amount in credits, at most two decimal places.
    pub amount: Option<CreditAmount>,
    /// Amount in cents. Must be positive.
    pub amount_cents: Option<i64>,
}

/// Add credits response.
#[derive(Debug, Serialize)]
pub struct AddCreditsResponse {
    /// The updated account.
    pub user: AccountResponse,
    /// The deposit transaction.
    pub transaction: TransactionResponse,
}

/// Top up the current user's balance.
pub async fn add_credits(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AddCreditsRequest>,
) -> Result<Json<AddCreditsResponse>, ApiError> {
    let amount_cents = requested_cents(body.amount.as_ref(), body.amount_cents)?;
    let (account, tx) = state
        .engine
        .credit(
            &auth.account_id,
            amount_cents,
            TransactionType::Deposit,
            "Credit top-up",
        )
        .await?;

    Ok(Json(AddCreditsResponse {
        user: AccountResponse::from(&account),
        transaction: TransactionResponse::from(&tx),
    }))
}
