//! Transaction history handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use chatmeter_core::{format_credits, CreditAmount, Transaction};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::PageQuery;
use crate::state::AppState;

/// Resolve a top-up body given as `amount` (decimal credits) or
/// `amount_cents`. Exactly one must be present.
pub(crate) fn requested_cents(
    amount: Option<&CreditAmount>,
    amount_cents: Option<i64>,
) -> Result<i64, ApiError> {
    match (amount, amount_cents) {
        (Some(amount), None) => Ok(amount.to_cents()?),
        (None, Some(cents)) => Ok(cents),
        (Some(_), Some(_)) => Err(ApiError::BadRequest(
            "Send either amount or amount_cents, not both".into(),
        )),
        (None, None) => Err(ApiError::BadRequest("amount is required".into())),
    }
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Position in the account's ledger.
    pub sequence: u64,
    /// Amount in cents (positive = credit, negative = debit).
    pub amount_cents: i64,
    /// Amount formatted for display.
    pub amount_formatted: String,
    /// Transaction type.
    pub transaction_type: String,
    /// Balance after this transaction.
    pub balance_after_cents: i64,
    /// Description.
    pub description: String,
    /// Additional metadata.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            sequence: tx.sequence,
            amount_cents: tx.amount_cents,
            amount_formatted: format_credits(tx.amount_cents),
            transaction_type: tx.transaction_type.as_str().to_string(),
            balance_after_cents: tx.balance_after_cents,
            description: tx.description.clone(),
            metadata: tx.metadata.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let (transactions, has_more) = query.paginate(|limit, offset| {
        state.engine.transactions(&auth.account_id, limit, offset)
    })?;

    Ok(Json(ListTransactionsResponse {
        transactions: transactions.iter().map(TransactionResponse::from).collect(),
        has_more,
    }))
}
