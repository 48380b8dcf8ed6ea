//! Ledger transaction types for chatmeter.
//!
//! Every change to a balance is a [`Transaction`]. Callers describe the change
//! as a [`LedgerEntry`]; the store turns it into a transaction once it knows
//! the balance it applies to, so `balance_after` can never drift from the
//! account record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, MeteringError, Result, TransactionId};

/// Display glyph of the credit unit.
pub const CREDIT_GLYPH: &str = "₮";

/// Format an amount of credit cents for display, e.g. `₮12.05` or `-₮0.50`.
///
/// Integer arithmetic only, so the rendering matches the ledger exactly.
#[must_use]
pub fn format_credits(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{CREDIT_GLYPH}{}.{:02}", abs / 100, abs % 100)
}

/// Parse a decimal credit amount such as `10.5` or `"25.00"` into cents.
///
/// The digits are read as written, with no floating point in between.
///
/// # Errors
///
/// Returns `InvalidAmount` for anything but plain decimal notation with at
/// most two fractional digits, for amounts that are zero or negative, and
/// for amounts that overflow `i64` cents.
pub fn parse_credits(text: &str) -> Result<i64> {
    let invalid = |why: &str| MeteringError::InvalidAmount(format!("{text:?} {why}"));

    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("is not a decimal credit amount"));
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) || digits.ends_with('.') {
        return Err(invalid("is not a decimal credit amount"));
    }
    if fraction.len() > 2 {
        return Err(invalid("has more than two decimal places"));
    }

    let overflow = || invalid("is too large");
    let whole: i64 = whole.parse().map_err(|_| overflow())?;
    let fraction: i64 = format!("{fraction:0<2}").parse().map_err(|_| overflow())?;
    let cents = whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or_else(overflow)?;

    if negative || cents == 0 {
        return Err(invalid("must be positive"));
    }
    Ok(cents)
}

/// A credit amount as sent over the wire: a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CreditAmount {
    /// `{"amount": 10.5}`
    Number(serde_json::Number),
    /// `{"amount": "10.50"}`
    Text(String),
}

impl CreditAmount {
    /// The amount in cents.
    ///
    /// # Errors
    ///
    /// See [`parse_credits`].
    pub fn to_cents(&self) -> Result<i64> {
        match self {
            Self::Number(n) => parse_credits(&n.to_string()),
            Self::Text(s) => parse_credits(s),
        }
    }
}

/// A balance change that has not been applied yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Signed amount in cents. Positive = credit, negative = debit.
    pub amount_cents: i64,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Human-readable description.
    pub description: String,

    /// Additional metadata (model, tokens, plan, admin id).
    pub metadata: serde_json::Value,
}

impl LedgerEntry {
    /// A credit of `amount_cents` (must be positive to be accepted).
    #[must_use]
    pub fn credit(
        amount_cents: i64,
        transaction_type: TransactionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            amount_cents,
            transaction_type,
            description: description.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// A debit of `amount_cents`. The stored amount is always negative.
    #[must_use]
    pub fn debit(
        amount_cents: i64,
        transaction_type: TransactionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            amount_cents: -amount_cents.abs(),
            transaction_type,
            description: description.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// A deposit (user top-up or admin grant).
    #[must_use]
    pub fn deposit(amount_cents: i64, description: impl Into<String>) -> Self {
        Self::credit(amount_cents, TransactionType::Deposit, description)
    }

    /// The charge for one metered chat.
    #[must_use]
    pub fn chat_cost(
        cost_cents: i64,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Self {
        Self::debit(
            cost_cents,
            TransactionType::ChatCost,
            format!("Chat with {model}"),
        )
        .with_metadata(serde_json::json!({
            "model": model,
            "input_tokens": input_tokens,
            "output_tokens": output_tokens,
        }))
    }

    /// The charge for subscribing to a plan.
    #[must_use]
    pub fn subscription(price_cents: i64, plan_name: &str) -> Self {
        Self::debit(
            price_cents,
            TransactionType::Subscription,
            format!("Subscription: {plan_name}"),
        )
        .with_metadata(serde_json::json!({ "plan": plan_name }))
    }

    /// Set metadata on the entry.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this entry removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        self.amount_cents < 0
    }
}

/// A ledger transaction. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID.
    pub id: TransactionId,

    /// The account whose balance was affected.
    pub account_id: AccountId,

    /// Position in the account's ledger, starting at 1.
    pub sequence: u64,

    /// Amount in cents. Positive = credit, Negative = debit.
    pub amount_cents: i64,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Balance after this transaction (in cents).
    pub balance_after_cents: i64,

    /// Human-readable description.
    pub description: String,

    /// Additional metadata.
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Materialize an entry applied at position `sequence`.
    #[must_use]
    pub fn from_entry(
        account_id: AccountId,
        sequence: u64,
        entry: &LedgerEntry,
        balance_after_cents: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            sequence,
            amount_cents: entry.amount_cents,
            transaction_type: entry.transaction_type,
            balance_after_cents,
            description: entry.description.clone(),
            metadata: entry.metadata.clone(),
            created_at,
        }
    }
}

/// Type of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credits added (top-up or admin grant).
    Deposit,

    /// Credits removed outside of metering (admin correction).
    Withdrawal,

    /// Charge for a metered chat.
    ChatCost,

    /// Charge for a subscription.
    Subscription,
}

impl TransactionType {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::ChatCost => "chat_cost",
            Self::Subscription => "subscription",
        }
    }
}
