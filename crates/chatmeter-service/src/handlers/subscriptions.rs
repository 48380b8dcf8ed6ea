//! Plan catalog and subscription handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use chatmeter_core::{format_credits, Plan, PlanId, Subscription, SubscriptionStatus};

use crate::auth::{AdminAuth, AuthUser};
use crate::engine::ActiveSubscription;
use crate::error::ApiError;
use crate::handlers::accounts::AccountResponse;
use crate::handlers::credits::TransactionResponse;
use crate::handlers::PageQuery;
use crate::state::AppState;

/// Plan response.
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    /// Plan ID.
    pub id: PlanId,
    /// Display name.
    pub name: String,
    /// Price in cents.
    pub price_cents: i64,
    /// Price formatted for display.
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
    pub description: Option<String>,
}

impl From<&Plan> for PlanResponse {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id,
            name: plan.name.clone(),
            price_cents: plan.price_cents,
            price_formatted: format_credits(plan.price_cents),
            duration_days: plan.duration_days,
            max_chats_per_hour: plan.max_chats_per_hour,
            max_tokens_per_month: plan.max_tokens_per_month,
            vip_model_access: plan.vip_model_access,
            description: plan.description.clone(),
        }
    }
}

/// Subscription response.
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    /// Subscription ID.
    pub id: String,
    /// Plan ID.
    pub plan_id: PlanId,
    /// Plan details, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanResponse>,
    /// Period start.
    pub start_date: String,
    /// Period end (exclusive).
    pub end_date: String,
    /// Effective status.
    pub status: SubscriptionStatus,
}

impl SubscriptionResponse {
    fn new(subscription: &Subscription, plan: Option<&Plan>) -> Self {
        Self {
            id: subscription.id.to_string(),
            plan_id: subscription.plan_id,
            plan: plan.map(PlanResponse::from),
            start_date: subscription.start_date.to_rfc3339(),
            end_date: subscription.end_date.to_rfc3339(),
            status: subscription.status_at(Utc::now()),
        }
    }
}

impl From<&ActiveSubscription> for SubscriptionResponse {
    fn from(active: &ActiveSubscription) -> Self {
        Self::new(&active.subscription, Some(&active.plan))
    }
}

/// List plans response.
#[derive(Debug, Serialize)]
pub struct ListPlansResponse {
    /// Plans ordered by ID.
    pub plans: Vec<PlanResponse>,
}

/// List the plan catalog.
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListPlansResponse>, ApiError> {
    let plans = state.engine.catalog().list()?;
    Ok(Json(ListPlansResponse {
        plans: plans.iter().map(PlanResponse::from).collect(),
    }))
}

/// Get one plan.
pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<u32>,
) -> Result<Json<PlanResponse>, ApiError> {
    let plan = state.engine.catalog().get(PlanId(plan_id))?;
    Ok(Json(PlanResponse::from(&plan)))
}

/// Create or replace a plan (admin).
pub async fn upsert_plan(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(plan): Json<Plan>,
) -> Result<Json<PlanResponse>, ApiError> {
    if plan.name.trim().is_empty() {
        return Err(ApiError::BadRequest("plan name must not be empty".into()));
    }

    let plan = state.engine.catalog().upsert(plan)?;
    tracing::info!(admin_id = %admin.admin_id, plan_id = %plan.id, "Plan saved by admin");
    Ok(Json(PlanResponse::from(&plan)))
}

/// Subscribe request.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    /// Plan to subscribe to.
    pub plan_id: PlanId,
}

/// Subscribe response.
#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    /// The new subscription.
    pub subscription: SubscriptionResponse,
    /// The updated account.
    pub user: AccountResponse,
    /// The charge, absent for free plans.
    pub transaction: Option<TransactionResponse>,
}

/// Subscribe the current user to a plan.
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let swap = state.engine.subscribe(&auth.account_id, body.plan_id).await?;
    let plan = state.engine.catalog().get(swap.subscription.plan_id)?;

    Ok(Json(SubscribeResponse {
        subscription: SubscriptionResponse::new(&swap.subscription, Some(&plan)),
        user: AccountResponse::from(&swap.account),
        transaction: swap.transaction.as_ref().map(TransactionResponse::from),
    }))
}

/// Current subscription response.
#[derive(Debug, Serialize)]
pub struct CurrentSubscriptionResponse {
    /// The active subscription, or `null`.
    pub subscription: Option<SubscriptionResponse>,
}

/// Get the current user's active subscription.
pub async fn current_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CurrentSubscriptionResponse>, ApiError> {
    let active = state.engine.current_subscription(&auth.account_id)?;
    Ok(Json(CurrentSubscriptionResponse {
        subscription: active.as_ref().map(SubscriptionResponse::from),
    }))
}

/// Subscription usage response.
#[derive(Debug, Serialize)]
pub struct SubscriptionUsageResponse {
    /// The active subscription.
    pub subscription: SubscriptionResponse,
    /// Chats counted this hour.
    pub chats_this_hour: u32,
    /// Chats left this hour.
    pub chats_remaining: u32,
    /// Tokens counted this month.
    pub tokens_this_month: u64,
    /// Tokens left this month.
    pub tokens_remaining: u64,
}

/// Get usage of the current subscription period.
pub async fn subscription_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<SubscriptionUsageResponse>, ApiError> {
    let usage = state.engine.subscription_usage(&auth.account_id)?;
    Ok(Json(SubscriptionUsageResponse {
        subscription: SubscriptionResponse::from(&usage.active),
        chats_this_hour: usage.chats_this_hour,
        chats_remaining: usage.chats_remaining(),
        tokens_this_month: usage.tokens_this_month,
        tokens_remaining: usage.tokens_remaining(),
    }))
}

/// Subscription status response.
#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    /// Whether a subscription is active right now.
    pub is_active: bool,
}

/// Check whether the current user has an active subscription.
pub async fn subscription_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<SubscriptionStatusResponse>, ApiError> {
    let active = state.engine.current_subscription(&auth.account_id)?;
    Ok(Json(SubscriptionStatusResponse {
        is_active: active.is_some(),
    }))
}

/// Subscription history response.
#[derive(Debug, Serialize)]
pub struct SubscriptionHistoryResponse {
    /// Subscriptions (newest first).
    pub subscriptions: Vec<SubscriptionResponse>,
    /// Whether there are more subscriptions.
    pub has_more: bool,
}

/// List past and present subscriptions.
pub async fn subscription_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<SubscriptionHistoryResponse>, ApiError> {
    let (history, has_more) = query.paginate(|limit, offset| {
        state
            .engine
            .subscription_history(&auth.account_id, limit, offset)
    })?;

    let subscriptions = history
        .iter()
        .map(|subscription| {
            let plan = state.engine.catalog().get(subscription.plan_id).ok();
            SubscriptionResponse::new(subscription, plan.as_ref())
        })
        .collect();

    Ok(Json(SubscriptionHistoryResponse {
        subscriptions,
        has_more,
    }))
}
