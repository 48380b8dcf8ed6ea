//! Chat metering, history and quota handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use chatmeter_core::{
    format_credits, ChatId, ChatStatistics, ChatUsageEvent, ModelStats, RateLimitScope,
    TokenSource,
};

use crate::auth::AuthUser;
use crate::engine::ChatRequest;
use crate::error::ApiError;
use crate::handlers::credits::TransactionResponse;
use crate::handlers::subscriptions::PlanResponse;
use crate::handlers::PageQuery;
use crate::state::AppState;

/// Create chat request.
#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    /// Model used.
    pub model_name: String,
    /// Exact prompt tokens.
    pub input_tokens: Option<u64>,
    /// Exact completion tokens.
    pub output_tokens: Option<u64>,
    /// Prompt text, used for counting when no exact counts are given.
    pub prompt: Option<String>,
    /// Completion text.
    pub completion: Option<String>,
    /// Client-side cost estimate in cents. Never charged.
    #[serde(alias = "cost")]
    pub cost_cents: Option<i64>,
}

impl From<CreateChatRequest> for ChatRequest {
    fn from(body: CreateChatRequest) -> Self {
        Self {
            model_name: body.model_name,
            input_tokens: body.input_tokens,
            output_tokens: body.output_tokens,
            prompt: body.prompt,
            completion: body.completion,
            client_cost_cents: body.cost_cents,
        }
    }
}

/// Chat response.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// Chat ID.
    pub id: String,
    /// Model used.
    pub model_name: String,
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Cost in cents.
    pub cost_cents: i64,
    /// Cost formatted for display.
    pub cost_formatted: String,
    /// Where the token counts came from.
    pub token_source: TokenSource,
    /// The paying transaction.
    pub transaction_id: String,
    /// Timestamp.
    pub timestamp: String,
}

impl From<&ChatUsageEvent> for ChatResponse {
    fn from(chat: &ChatUsageEvent) -> Self {
        Self {
            id: chat.id.to_string(),
            model_name: chat.model_name.clone(),
            input_tokens: chat.input_tokens,
            output_tokens: chat.output_tokens,
            total_tokens: chat.total_tokens(),
            cost_cents: chat.cost_cents,
            cost_formatted: format_credits(chat.cost_cents),
            token_source: chat.token_source,
            transaction_id: chat.transaction_id.to_string(),
            timestamp: chat.timestamp.to_rfc3339(),
        }
    }
}

/// Create chat response.
#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    /// The metered chat.
    pub chat: ChatResponse,
    /// The `chat_cost` transaction.
    pub transaction: TransactionResponse,
    /// Balance after the charge in cents.
    pub balance_cents: i64,
    /// Balance formatted for display.
    pub balance_formatted: String,
    /// Chats counted this hour, including this one.
    pub chats_this_hour: u32,
    /// Tokens counted this month, including this chat.
    pub tokens_this_month: u64,
    /// Whether another chat may be sent now.
    pub can_send_chat: bool,
}

/// Meter a chat.
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<CreateChatResponse>), ApiError> {
    if body.model_name.trim().is_empty() {
        return Err(ApiError::BadRequest("model_name is required".into()));
    }

    let receipt = state
        .engine
        .meter_chat(&auth.account_id, body.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateChatResponse {
            chat: ChatResponse::from(&receipt.chat),
            transaction: TransactionResponse::from(&receipt.transaction),
            balance_cents: receipt.balance_cents,
            balance_formatted: format_credits(receipt.balance_cents),
            chats_this_hour: receipt.quota.chats_this_hour,
            tokens_this_month: receipt.quota.tokens_this_month,
            can_send_chat: receipt.quota.allowed,
        }),
    ))
}

/// List chats response.
#[derive(Debug, Serialize)]
pub struct ListChatsResponse {
    /// Chats (newest first).
    pub chats: Vec<ChatResponse>,
    /// Whether there are more chats.
    pub has_more: bool,
}

/// List the current user's chats.
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListChatsResponse>, ApiError> {
    let (chats, has_more) =
        query.paginate(|limit, offset| state.engine.chats(&auth.account_id, limit, offset))?;

    Ok(Json(ListChatsResponse {
        chats: chats.iter().map(ChatResponse::from).collect(),
        has_more,
    }))
}

/// Get one of the current user's chats.
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatResponse>, ApiError> {
    let chat_id = chat_id
        .parse::<ChatId>()
        .map_err(|_| ApiError::BadRequest("Invalid chat ID".into()))?;
    let chat = state.engine.chat(&auth.account_id, &chat_id)?;
    Ok(Json(ChatResponse::from(&chat)))
}

/// Chat statistics response.
#[derive(Debug, Serialize)]
pub struct ChatStatisticsResponse {
    /// Number of chats.
    pub total_chats: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Total cost in cents.
    pub total_cost_cents: i64,
    /// Total cost formatted for display.
    pub total_cost_formatted: String,
    /// Breakdown by model.
    pub model_stats: BTreeMap<String, ModelStats>,
}

impl From<ChatStatistics> for ChatStatisticsResponse {
    fn from(stats: ChatStatistics) -> Self {
        Self {
            total_chats: stats.total_chats,
            total_tokens: stats.total_tokens,
            total_cost_cents: stats.total_cost_cents,
            total_cost_formatted: format_credits(stats.total_cost_cents),
            model_stats: stats.model_stats,
        }
    }
}

/// Aggregate the current user's chats.
pub async fn chat_statistics(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ChatStatisticsResponse>, ApiError> {
    let stats = state.engine.chat_statistics(&auth.account_id)?;
    Ok(Json(stats.into()))
}

/// Rate limit status response.
#[derive(Debug, Serialize)]
pub struct RateLimitStatusResponse {
    /// Whether another chat may be sent now.
    pub can_send_chat: bool,
    /// Chats counted this hour.
    pub chats_this_hour: u32,
    /// Tokens counted this month.
    pub tokens_this_month: u64,
    /// The exhausted window, if a limit is reached.
    pub exhausted: Option<RateLimitScope>,
    /// The plan granting the quota, or `null` without a subscription.
    pub plan: Option<PlanResponse>,
}

/// Quota status of the current user.
pub async fn rate_limit_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<RateLimitStatusResponse>, ApiError> {
    let status = state.engine.rate_limit_status(&auth.account_id)?;
    Ok(Json(RateLimitStatusResponse {
        can_send_chat: status.check.allowed,
        chats_this_hour: status.check.chats_this_hour,
        tokens_this_month: status.check.tokens_this_month,
        exhausted: status.check.exhausted,
        plan: status.plan.as_ref().map(PlanResponse::from),
    }))
}

/// Model entry.
#[derive(Debug, Serialize)]
pub struct ModelResponse {
    /// Model name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Whether a VIP plan is required.
    pub requires_vip: bool,
}

/// Available models response.
#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    /// Models the caller may use.
    pub models: Vec<ModelResponse>,
}

/// List the models the current user may use.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListModelsResponse>, ApiError> {
    let account = state.engine.account(&auth.account_id)?;
    let vip_access = account.is_admin()
        || state
            .engine
            .current_subscription(&auth.account_id)?
            .is_some_and(|active| active.plan.vip_model_access);

    let models = state
        .engine
        .pricing()
        .available_models(vip_access)
        .map(|model| ModelResponse {
            name: model.name.clone(),
            description: model.description.clone(),
            requires_vip: model.requires_vip,
        })
        .collect();

    Ok(Json(ListModelsResponse { models }))
}
