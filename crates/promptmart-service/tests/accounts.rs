//! Account, balance and ledger integration tests.

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use common::TestHarness;
use serde_json::json;

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn create_account_success() {
    let harness = TestHarness::new();

    let response = harness.user_post("/v1/accounts").json(&json!({})).await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["user_id"], harness.test_user_id.to_string());
    assert_eq!(body["balance_coins"], 0);
}

#[tokio::test]
async fn create_account_without_auth_fails() {
    let harness = TestHarness::new();

    let response = harness.server.post("/v1/accounts").json(&json!({})).await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forged_token_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_static("Bearer not-a-jwt"),
        )
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_account_duplicate_conflicts() {
    let harness = TestHarness::new();

    harness
        .user_post("/v1/accounts")
        .await
        .assert_status_ok();

    let response = harness.user_post("/v1/accounts").await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn get_account_before_registering_is_not_found() {
    let harness = TestHarness::new();

    let response = harness.user_get("/v1/accounts/me").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_account_returns_balance() {
    let harness = TestHarness::new();
    harness.seed_account(75).await;

    let response = harness.user_get("/v1/accounts/me").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance_coins"], 75);
}

// ============================================================================
// Balance and ledger
// ============================================================================

#[tokio::test]
async fn balance_reflects_store() {
    let harness = TestHarness::new();
    harness.seed_account(40).await;

    let response = harness.user_get("/v1/credits/balance").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance_coins"], 40);
}

#[tokio::test]
async fn ledger_lists_newest_first_with_pagination() {
    let harness = TestHarness::new();
    harness.seed_account(100).await;
    let first = harness.seed_item("First", 10).await;
    let second = harness.seed_item("Second", 20).await;

    harness
        .user_post(&format!("/v1/items/{}/purchase", first.item_id))
        .await
        .assert_status_ok();
    harness
        .user_post(&format!("/v1/items/{}/purchase", second.item_id))
        .await
        .assert_status_ok();

    let response = harness.user_get("/v1/credits/ledger?limit=1").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["reference_id"], second.item_id.to_string());
    assert_eq!(entries[0]["delta_coins"], -20);
    assert_eq!(entries[0]["balance_after_coins"], 70);
    assert_eq!(entries[0]["reason"], "purchase");
    assert_eq!(body["has_more"], true);

    let response = harness.user_get("/v1/credits/ledger?limit=1&offset=1").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["entries"][0]["reference_id"], first.item_id.to_string());
    assert_eq!(body["has_more"], false);
}
