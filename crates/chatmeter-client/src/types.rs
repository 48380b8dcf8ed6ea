//! Request and response types for the chatmeter client.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatmeter_core::{
    AccountStatus, ModelStats, PlanId, RateLimitScope, Role, SubscriptionStatus, TokenSource,
    TransactionType,
};

/// Bearer token issued by the identity service.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    /// The bearer token.
    pub access_token: String,
    /// Token type, normally `bearer`.
    pub token_type: String,
}

/// Health check response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    /// `ok` when the service is up.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
}

/// Account details.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
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
    pub created_at: DateTime<Utc>,
}

/// Registration and profile update body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileRequest {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Contact email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A ledger transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    /// Transaction ID.
    pub id: String,
    /// Per-account sequence number.
    pub sequence: u64,
    /// Signed amount in cents.
    pub amount_cents: i64,
    /// Amount formatted for display.
    pub amount_formatted: String,
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Balance after this transaction in cents.
    pub balance_after_cents: i64,
    /// Description.
    pub description: String,
    /// Audit metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

/// Credit top-up response.
#[derive(Debug, Clone, Deserialize)]
pub struct AddCreditsResponse {
    /// The account after the deposit.
    pub user: Account,
    /// The deposit.
    pub transaction: Transaction,
}

/// A page of transactions.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionPage {
    /// Transactions (newest first).
    pub transactions: Vec<Transaction>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// A subscription plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Plan ID.
    pub id: PlanId,
    /// Display name.
    pub name: String,
    /// Price in cents.
    pub price_cents: i64,
    /// Price formatted for display.
    #[serde(default, skip_serializing)]
    pub price_formatted: String,
    /// Period length in days.
    pub duration_days: u32,
    /// Chats allowed per hour.
    pub max_chats_per_hour: u32,
    /// Tokens allowed per month.
    pub max_tokens_per_month: u64,
    /// Whether VIP models are included.
    pub vip_model_access: bool,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlanList {
    pub plans: Vec<Plan>,
}

/// A subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: String,
    /// Plan ID.
    pub plan_id: PlanId,
    /// Plan details, when known.
    #[serde(default)]
    pub plan: Option<Plan>,
    /// Period start.
    pub start_date: DateTime<Utc>,
    /// Period end (exclusive).
    pub end_date: DateTime<Utc>,
    /// Effective status.
    pub status: SubscriptionStatus,
}

/// Subscribe response.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeResponse {
    /// The new subscription.
    pub subscription: Subscription,
    /// The account after the charge.
    pub user: Account,
    /// The charge, absent for free plans.
    pub transaction: Option<Transaction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentSubscription {
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionStatusBody {
    pub is_active: bool,
}

/// Usage of the current subscription period.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionUsage {
    /// The active subscription.
    pub subscription: Subscription,
    /// Chats counted this hour.
    pub chats_this_hour: u32,
    /// Chats left this hour.
    pub chats_remaining: u32,
    /// Tokens counted this month.
    pub tokens_this_month: u64,
    /// Tokens left this month.
    pub tokens_remaining: u64,
}

/// A page of subscriptions.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionPage {
    /// Subscriptions (newest first).
    pub subscriptions: Vec<Subscription>,
    /// Whether there are more subscriptions.
    pub has_more: bool,
}

/// Chat to meter.
///
/// Token counts are authoritative when both are present; otherwise the
/// service counts or estimates them from `prompt` and `completion`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatRequest {
    /// Model used.
    pub model_name: String,
    /// Reported input tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    /// Reported output tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    /// Prompt text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Completion text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
}

/// A metered chat.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Chat ID.
    pub id: String,
    /// Model used.
    pub model_name: String,
    /// Input tokens.
    pub input_tokens: u64,
    /// Output tokens.
    pub output_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Charged cost in cents.
    pub cost_cents: i64,
    /// Cost formatted for display.
    pub cost_formatted: String,
    /// Where the token counts came from.
    pub token_source: TokenSource,
    /// The ledger transaction that paid for it.
    pub transaction_id: String,
    /// When the chat was metered.
    pub timestamp: DateTime<Utc>,
}

/// Result of metering a chat.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReceipt {
    /// The recorded chat.
    pub chat: Chat,
    /// The charge.
    pub transaction: Transaction,
    /// Balance after the charge in cents.
    pub balance_cents: i64,
    /// Balance formatted for display.
    pub balance_formatted: String,
    /// Chats counted this hour, including this one.
    pub chats_this_hour: u32,
    /// Tokens counted this month, including this chat.
    pub tokens_this_month: u64,
    /// Whether another chat would currently pass the quota check.
    pub can_send_chat: bool,
}

/// A page of chats.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatPage {
    /// Chats (newest first).
    pub chats: Vec<Chat>,
    /// Whether there are more chats.
    pub has_more: bool,
}

/// Aggregate chat statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatStatistics {
    /// Number of chats.
    pub total_chats: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Total cost in cents.
    pub total_cost_cents: i64,
    /// Total cost formatted for display.
    pub total_cost_formatted: String,
    /// Per-model breakdown.
    pub model_stats: BTreeMap<String, ModelStats>,
}

/// Quota status for the current user.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitStatus {
    /// Whether a chat would currently pass the quota check.
    pub can_send_chat: bool,
    /// Chats counted this hour.
    pub chats_this_hour: u32,
    /// Tokens counted this month.
    pub tokens_this_month: u64,
    /// The exhausted window, if any.
    pub exhausted: Option<RateLimitScope>,
    /// The active plan, if any.
    pub plan: Option<Plan>,
}

/// A model the user may select.
#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    /// Model name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Whether the model needs VIP access.
    pub requires_vip: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelList {
    pub models: Vec<Model>,
}

/// A page of accounts (admin).
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPage {
    /// Accounts.
    pub users: Vec<Account>,
    /// Whether there are more accounts.
    pub has_more: bool,
}

/// Service-wide totals (admin).
#[derive(Debug, Clone, Deserialize)]
pub struct AdminStats {
    /// Registered accounts.
    pub total_users: u64,
    /// Active accounts.
    pub active_users: u64,
    /// Lifetime deposits in cents.
    pub total_revenue_cents: i64,
    /// Lifetime spend in cents.
    pub total_spent_cents: i64,
    /// Metered chats.
    pub total_chats: u64,
    /// Revenue formatted for display.
    pub total_revenue_formatted: String,
    /// Spend formatted for display.
    pub total_spent_formatted: String,
}

/// Admin action on an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    /// Flip between active and inactive.
    ToggleStatus,
    /// Ask the identity service to reset the password.
    ResetPassword,
    /// Grant credits, in cents.
    AddCredits(i64),
}

impl AdminAction {
    /// Path segment for the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ToggleStatus => "toggle_status",
            Self::ResetPassword => "reset_password",
            Self::AddCredits(_) => "add_credits",
        }
    }
}

/// Admin action response.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminActionResponse {
    /// The action performed.
    pub action: String,
    /// The account after the action.
    pub user: Account,
    /// The ledger transaction, for credit grants.
    #[serde(default)]
    pub transaction: Option<Transaction>,
}

/// Pagination parameters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Page {
    /// Maximum items to return (the server caps this at 100).
    pub limit: usize,
    /// Items to skip.
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
