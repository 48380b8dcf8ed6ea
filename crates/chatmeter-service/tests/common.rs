//! Common test utilities for chatmeter integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use chatmeter_core::{AccountId, Role};
use chatmeter_service::auth::JwtClaims;
use chatmeter_service::{
    create_router, AppState, IdentityError, IdentityProvider, NoTokenCounter, ServiceConfig,
    TokenGrant,
};
use chatmeter_store::{MemoryStore, Store};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ADMIN_KEY: &str = "test-admin-key";

/// Identity provider that accepts one password and records resets.
#[derive(Default)]
pub struct StubIdentity {
    pub resets: Mutex<Vec<AccountId>>,
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn issue_token(&self, _username: &str, password: &str) -> Result<TokenGrant, IdentityError> {
        if password != "correct-horse" {
            return Err(IdentityError::InvalidCredentials);
        }
        Ok(TokenGrant {
            access_token: "stub-token".into(),
            token_type: "bearer".into(),
        })
    }

    async fn reset_password(&self, account_id: &AccountId) -> Result<(), IdentityError> {
        self.resets.lock().unwrap().push(*account_id);
        Ok(())
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The backing store, for fault injection and direct inspection.
    pub store: Arc<MemoryStore>,
    /// The identity stub.
    pub identity: Arc<StubIdentity>,
    /// A test user ID for authenticated requests.
    pub test_user_id: AccountId,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(StubIdentity::default());

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: ":memory:".into(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            admin_api_key: Some(ADMIN_KEY.into()),
            ..ServiceConfig::default()
        };

        let state = AppState::with_collaborators(
            Arc::clone(&store) as Arc<dyn Store>,
            config,
            Arc::clone(&identity) as Arc<dyn IdentityProvider>,
            Arc::new(NoTokenCounter),
        )
        .expect("Failed to build app state");
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            identity,
            test_user_id: AccountId::generate(),
        }
    }

    /// Get the authorization header for the test user.
    pub fn user_auth_header(&self) -> String {
        bearer(&self.test_user_id, Role::User)
    }

    /// Register the test user's account.
    pub async fn register(&self) {
        self.register_as(&self.test_user_id, Role::User).await;
    }

    /// Register an account for `account_id` with `role`.
    pub async fn register_as(&self, account_id: &AccountId, role: Role) {
        self.server
            .post("/accounts")
            .add_header("authorization", bearer(account_id, role))
            .json(&json!({ "username": "tester" }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    /// Grant credits through the admin API.
    pub async fn grant(&self, account_id: &AccountId, amount_cents: i64) {
        self.server
            .post(&format!("/admin/users/{account_id}/add_credits"))
            .add_header("x-admin-key", ADMIN_KEY)
            .json(&json!({ "amount_cents": amount_cents }))
            .await
            .assert_status_ok();
    }

    /// Register the test user with `balance` cents left after subscribing to
    /// `plan_id`.
    pub async fn subscribed_user(&self, balance: i64, plan_id: u32) {
        self.register().await;

        let plan: serde_json::Value = self
            .server
            .get(&format!("/subscription-plans/{plan_id}"))
            .await
            .json();
        let price = plan["price_cents"].as_i64().unwrap();

        if balance + price > 0 {
            self.grant(&self.test_user_id, balance + price).await;
        }
        self.server
            .post("/subscribe")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({ "plan_id": plan_id }))
            .await
            .assert_status_ok();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Mint an identity token for `account_id`.
pub fn bearer(account_id: &AccountId, role: Role) -> String {
    let claims = JwtClaims {
        sub: account_id.to_string(),
        iss: None,
        exp: chrono::Utc::now().timestamp() + 3600,
        iat: chrono::Utc::now().timestamp(),
        username: None,
        email: None,
        role: Some(role),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token");
    format!("Bearer {token}")
}
