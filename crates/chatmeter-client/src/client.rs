//! Chatmeter HTTP client implementation.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

use chatmeter_core::{PlanId, RateLimitScope};

use crate::error::ClientError;
use crate::types::{
    Account, AccountPage, AddCreditsResponse, AdminAction, AdminActionResponse, AdminStats,
    ApiErrorBody, ApiErrorResponse, Chat, ChatPage, ChatReceipt, ChatRequest, ChatStatistics,
    CurrentSubscription, HealthResponse, Model, ModelList, Page, Plan, PlanList, ProfileRequest,
    RateLimitStatus, SubscribeResponse, Subscription, SubscriptionPage, SubscriptionStatusBody,
    SubscriptionUsage, TokenGrant, TransactionPage,
};

/// Chatmeter API client.
///
/// User calls authenticate with a bearer token from [`login`](Self::login);
/// admin calls additionally accept an admin API key.
#[derive(Debug, Clone)]
pub struct ChatmeterClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    admin_key: Option<String>,
}

impl ChatmeterClient {
    /// Create a new client with default options.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            admin_key: options.admin_key,
        })
    }

    /// A copy of this client that sends `token` as its bearer credential.
    #[must_use]
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self.clone()
        }
    }

    // ------------------------------------------------------------------
    // Public
    // ------------------------------------------------------------------

    /// Check service health.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.send(self.request(Method::GET, "/health")).await
    }

    /// Exchange credentials for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for wrong credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenGrant, ClientError> {
        let body = serde_json::json!({ "username": username, "password": password });
        self.send(self.request(Method::POST, "/token").json(&body))
            .await
    }

    /// List the plan catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn plans(&self) -> Result<Vec<Plan>, ClientError> {
        let list: PlanList = self
            .send(self.request(Method::GET, "/subscription-plans"))
            .await?;
        Ok(list.plans)
    }

    /// Get one plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the plan does not exist.
    pub async fn plan(&self, plan_id: PlanId) -> Result<Plan, ClientError> {
        let path = format!("/subscription-plans/{plan_id}");
        self.send(self.request(Method::GET, &path)).await
    }

    // ------------------------------------------------------------------
    // Account
    // ------------------------------------------------------------------

    /// Register the ledger account for the current token.
    ///
    /// # Errors
    ///
    /// Returns an `Api` error with code `conflict` if it already exists.
    pub async fn register(&self, profile: &ProfileRequest) -> Result<Account, ClientError> {
        self.send(self.request(Method::POST, "/accounts").json(profile))
            .await
    }

    /// Get the current account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn me(&self) -> Result<Account, ClientError> {
        self.send(self.request(Method::GET, "/users/me")).await
    }

    /// Update the current account's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn update_profile(&self, profile: &ProfileRequest) -> Result<Account, ClientError> {
        self.send(self.request(Method::PUT, "/users/me").json(profile))
            .await
    }

    /// Top up the current account.
    ///
    /// # Errors
    ///
    /// Returns an `Api` error with code `invalid_amount` unless
    /// `amount_cents > 0`.
    pub async fn add_credits(&self, amount_cents: i64) -> Result<AddCreditsResponse, ClientError> {
        let body = serde_json::json!({ "amount_cents": amount_cents });
        self.send(
            self.request(Method::POST, "/users/me/add-credits")
                .json(&body),
        )
        .await
    }

    /// Ledger history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn transactions(&self, page: Page) -> Result<TransactionPage, ClientError> {
        self.send(
            self.request(Method::GET, "/users/me/transactions")
                .query(&page),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe to a plan, replacing any active subscription.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientCredit` if the balance does not cover the price.
    pub async fn subscribe(&self, plan_id: PlanId) -> Result<SubscribeResponse, ClientError> {
        let body = serde_json::json!({ "plan_id": plan_id });
        self.send(self.request(Method::POST, "/subscribe").json(&body))
            .await
    }

    /// The active subscription, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn current_subscription(&self) -> Result<Option<Subscription>, ClientError> {
        let body: CurrentSubscription = self
            .send(self.request(Method::GET, "/users/me/subscription"))
            .await?;
        Ok(body.subscription)
    }

    /// Usage of the active subscription's period.
    ///
    /// # Errors
    ///
    /// Returns an `Api` error with code `no_subscription` if none is active.
    pub async fn subscription_usage(&self) -> Result<SubscriptionUsage, ClientError> {
        self.send(self.request(Method::GET, "/users/me/subscription/usage"))
            .await
    }

    /// Whether a subscription is active right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn has_active_subscription(&self) -> Result<bool, ClientError> {
        let body: SubscriptionStatusBody = self
            .send(self.request(Method::GET, "/users/me/subscription/status"))
            .await?;
        Ok(body.is_active)
    }

    /// Past and present subscriptions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn subscription_history(&self, page: Page) -> Result<SubscriptionPage, ClientError> {
        self.send(
            self.request(Method::GET, "/users/me/subscription/history")
                .query(&page),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    /// Meter a chat.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` or `InsufficientCredit` when the chat is refused.
    pub async fn send_chat(&self, chat: &ChatRequest) -> Result<ChatReceipt, ClientError> {
        self.send(self.request(Method::POST, "/chats").json(chat))
            .await
    }

    /// Chat history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn chats(&self, page: Page) -> Result<ChatPage, ClientError> {
        self.send(self.request(Method::GET, "/chats").query(&page))
            .await
    }

    /// Get one chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the chat does not exist.
    pub async fn chat(&self, chat_id: &str) -> Result<Chat, ClientError> {
        let path = format!("/chats/{chat_id}");
        self.send(self.request(Method::GET, &path)).await
    }

    /// Aggregate chat statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn chat_statistics(&self) -> Result<ChatStatistics, ClientError> {
        self.send(self.request(Method::GET, "/users/me/chat-statistics"))
            .await
    }

    /// Current quota status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn rate_limit_status(&self) -> Result<RateLimitStatus, ClientError> {
        self.send(self.request(Method::GET, "/users/me/rate-limit-status"))
            .await
    }

    /// Models the current user may select.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn models(&self) -> Result<Vec<Model>, ClientError> {
        let list: ModelList = self.send(self.request(Method::GET, "/models")).await?;
        Ok(list.models)
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    /// List accounts.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` or a `forbidden` API error without admin rights.
    pub async fn admin_users(&self, page: Page) -> Result<AccountPage, ClientError> {
        self.send(self.request(Method::GET, "/admin/users").query(&page))
            .await
    }

    /// Service-wide totals.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` or a `forbidden` API error without admin rights.
    pub async fn admin_stats(&self) -> Result<AdminStats, ClientError> {
        self.send(self.request(Method::GET, "/admin/stats")).await
    }

    /// Perform an action on an account.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` or a `forbidden` API error without admin rights.
    pub async fn admin_action(
        &self,
        user_id: &str,
        action: &AdminAction,
    ) -> Result<AdminActionResponse, ClientError> {
        let path = format!("/admin/users/{user_id}/{}", action.as_str());
        let request = match action {
            AdminAction::AddCredits(amount_cents) => self
                .request(Method::POST, &path)
                .json(&serde_json::json!({ "amount_cents": amount_cents })),
            AdminAction::ToggleStatus | AdminAction::ResetPassword => {
                self.request(Method::POST, &path)
            }
        };
        self.send(request).await
    }

    /// Create or replace a plan.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` or a `forbidden` API error without admin rights.
    pub async fn upsert_plan(&self, plan: &Plan) -> Result<Plan, ClientError> {
        self.send(self.request(Method::POST, "/subscription-plans").json(plan))
            .await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(key) = &self.admin_key {
            builder = builder.header("x-admin-key", key);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        tracing::debug!(url = %response.url(), status = %response.status(), "chatmeter response");
        handle_response(response).await
    }
}

/// Convert a response into `T`, mapping error bodies to typed errors.
async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();

    if status.is_success() {
        let bytes = response.bytes().await?;
        return Ok(serde_json::from_slice(&bytes)?);
    }

    let Ok(api_error) = response.json::<ApiErrorResponse>().await else {
        return Err(ClientError::Api {
            code: "unknown".to_string(),
            message: format!("HTTP {status}"),
            status: status.as_u16(),
        });
    };

    let ApiErrorBody {
        code,
        message,
        details,
    } = api_error.error;
    let details = details.unwrap_or_default();
    let detail_i64 = |key: &str| details.get(key).and_then(serde_json::Value::as_i64);
    let scope = details
        .get("scope")
        .and_then(|v| serde_json::from_value::<RateLimitScope>(v.clone()).ok());

    match (code.as_str(), scope) {
        ("unauthorized", _) => Err(ClientError::Unauthorized),
        ("insufficient_credit", _) => Err(ClientError::InsufficientCredit {
            balance: detail_i64("balance_cents").unwrap_or(0),
            required: detail_i64("required_cents").unwrap_or(0),
        }),
        ("rate_limited", Some(scope)) => Err(ClientError::RateLimited { scope }),
        _ => Err(ClientError::Api {
            code,
            message,
            status: status.as_u16(),
        }),
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Admin API key sent as `X-Admin-Key`.
    pub admin_key: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            admin_key: None,
        }
    }
}

impl ClientOptions {
    /// Options carrying an admin API key.
    #[must_use]
    pub fn with_admin_key(key: impl Into<String>) -> Self {
        Self {
            admin_key: Some(key.into()),
            ..Self::default()
        }
    }
}
