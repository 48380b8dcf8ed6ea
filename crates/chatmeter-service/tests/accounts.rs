//! Account, profile and ledger integration tests.

mod common;

use axum::http::StatusCode;
use chatmeter_core::{AccountId, Role};
use common::{bearer, TestHarness};
use serde_json::json;

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn register_creates_zero_balance_account() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/accounts")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "username": "alice", "email": "alice@example.com" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["id"], harness.test_user_id.to_string());
    assert_eq!(body["username"], "alice");
    assert_eq!(body["balance_cents"], 0);
    assert_eq!(body["balance_formatted"], "₮0.00");
    assert_eq!(body["status"], "active");
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn register_twice_conflicts() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .post("/accounts")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn me_without_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/users/me")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_not_found();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn me_without_auth_fails() {
    let harness = TestHarness::new();

    harness.server.get("/users/me").await.assert_status_unauthorized();
}

#[tokio::test]
async fn token_signed_with_other_secret_is_rejected() {
    let harness = TestHarness::new();
    let claims = json!({
        "sub": harness.test_user_id.to_string(),
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"someone-else"),
    )
    .unwrap();

    harness
        .server
        .get("/users/me")
        .add_header("authorization", format!("Bearer {token}"))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let harness = TestHarness::new();
    let claims = json!({
        "sub": harness.test_user_id.to_string(),
        "exp": chrono::Utc::now().timestamp() - 3600,
    });
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(common::JWT_SECRET.as_bytes()),
    )
    .unwrap();

    harness
        .server
        .get("/users/me")
        .add_header("authorization", format!("Bearer {token}"))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn profile_update_returns_updated_account() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .put("/users/me")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "username": "renamed", "email": "new@example.com" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["username"], "renamed");
    assert_eq!(body["email"], "new@example.com");
}

// ============================================================================
// Credits and transactions
// ============================================================================

#[tokio::test]
async fn add_credits_returns_user_and_deposit() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .post("/users/me/add-credits")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount_cents": 1205 }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["user"]["balance_cents"], 1205);
    assert_eq!(body["user"]["balance_formatted"], "₮12.05");
    assert_eq!(body["transaction"]["transaction_type"], "deposit");
    assert_eq!(body["transaction"]["balance_after_cents"], 1205);
}

#[tokio::test]
async fn add_credits_rejects_non_positive_amounts() {
    let harness = TestHarness::new();
    harness.register().await;

    for amount in [0, -50] {
        let response = harness
            .server
            .post("/users/me/add-credits")
            .add_header("authorization", harness.user_auth_header())
            .json(&json!({ "amount_cents": amount }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "invalid_amount");
    }
}

#[tokio::test]
async fn add_credits_accepts_decimal_amount() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .post("/users/me/add-credits")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount": 10.5 }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["user"]["balance_cents"], 1050);
    assert_eq!(body["transaction"]["amount_cents"], 1050);

    harness
        .server
        .post("/users/me/add-credits")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount": "0.29" }))
        .await
        .assert_status_ok();
    let me: serde_json::Value = harness
        .server
        .get("/users/me")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(me["balance_cents"], 1079);
}

#[tokio::test]
async fn add_credits_rejects_bad_decimal_amounts() {
    let harness = TestHarness::new();
    harness.register().await;

    for amount in [json!(1.005), json!(0), json!(-2.5), json!("1e3")] {
        let response = harness
            .server
            .post("/users/me/add-credits")
            .add_header("authorization", harness.user_auth_header())
            .json(&json!({ "amount": amount }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "invalid_amount", "amount {amount}");
    }

    harness
        .server
        .post("/users/me/add-credits")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount": 1, "amount_cents": 100 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let me: serde_json::Value = harness
        .server
        .get("/users/me")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(me["balance_cents"], 0);
}

#[tokio::test]
async fn transactions_are_newest_first_with_has_more() {
    let harness = TestHarness::new();
    harness.register().await;

    for amount in [100, 200, 300] {
        harness
            .server
            .post("/users/me/add-credits")
            .add_header("authorization", harness.user_auth_header())
            .json(&json!({ "amount_cents": amount }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get("/users/me/transactions?limit=2")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0]["amount_cents"], 300);
    assert_eq!(transactions[0]["balance_after_cents"], 600);
    assert_eq!(transactions[1]["amount_cents"], 200);
    assert_eq!(body["has_more"], true);

    let response = harness
        .server
        .get("/users/me/transactions?limit=2&offset=2")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn accounts_are_isolated() {
    let harness = TestHarness::new();
    harness.register().await;
    harness.grant(&harness.test_user_id, 500).await;

    let other = AccountId::generate();
    harness.register_as(&other, Role::User).await;

    let response = harness
        .server
        .get("/users/me")
        .add_header("authorization", bearer(&other, Role::User))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance_cents"], 0);
}

// ============================================================================
// Store failures
// ============================================================================

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let harness = TestHarness::new();
    harness.register().await;
    harness.store.set_offline(true);

    let response = harness
        .server
        .get("/users/me")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "store_unavailable");

    harness.store.set_offline(false);
    harness
        .server
        .get("/users/me")
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status_ok();
}
