//! Catalog, entitlement and admin integration tests.

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use common::TestHarness;
use serde_json::json;

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn admin_creates_items_listed_publicly() {
    let harness = TestHarness::new();

    let response = harness
        .admin_post("/v1/admin/items")
        .json(&json!({
            "title": "Cyberpunk heist",
            "description": "Crew assembly scene",
            "content": "Open on a rain-soaked rooftop where the crew meets for the last job",
            "price_coins": 25,
            "category": "scifi",
            "tags": ["heist", "neon"]
        }))
        .await;
    response.assert_status_ok();
    let created: serde_json::Value = response.json();
    assert_eq!(created["price_coins"], 25);
    assert!(created.get("content").is_none());

    harness.seed_item("Noir opener", 30).await;

    let response = harness.server.get("/v1/items").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let response = harness.server.get("/v1/items?category=scifi").await;
    let body: serde_json::Value = response.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Cyberpunk heist");

    let response = harness.server.get("/v1/items?q=neon").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_endpoints_require_the_key() {
    let harness = TestHarness::new();
    let item = json!({
        "title": "Sneaky",
        "content": "content",
        "price_coins": 5,
        "category": "misc"
    });

    let response = harness.server.post("/v1/admin/items").json(&item).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = harness
        .server
        .post("/v1/admin/items")
        .add_header(
            HeaderName::from_static("x-admin-key"),
            HeaderValue::from_static("wrong-key"),
        )
        .json(&item)
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_item_is_bad_request() {
    let harness = TestHarness::new();

    let response = harness
        .admin_post("/v1/admin/items")
        .json(&json!({
            "title": "Free lunch",
            "content": "content",
            "price_coins": 0,
            "category": "misc"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Item detail and entitlements
// ============================================================================

#[tokio::test]
async fn detail_shows_preview_until_owned() {
    let harness = TestHarness::new();
    harness.seed_account(50).await;
    let item = harness.seed_item("Noir opener", 30).await;
    let path = format!("/v1/items/{}", item.item_id);

    let response = harness.user_get(&path).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["owned"], false);
    assert_eq!(body["title"], "Noir opener");
    assert_eq!(body["content"], item.preview_text());

    harness
        .user_post(&format!("{path}/purchase"))
        .await
        .assert_status_ok();

    let response = harness.user_get(&path).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["owned"], true);
    let content = body["content"].as_str().unwrap();
    assert!(content.starts_with(&item.content));
    assert!(content.contains(&harness.test_user_id.to_string()));
}

#[tokio::test]
async fn entitlements_list_owned_items() {
    let harness = TestHarness::new();
    harness.seed_account(100).await;
    let first = harness.seed_item("First", 10).await;
    let second = harness.seed_item("Second", 20).await;
    harness.seed_item("Not bought", 5).await;

    for item in [&first, &second] {
        harness
            .user_post(&format!("/v1/items/{}/purchase", item.item_id))
            .await
            .assert_status_ok();
    }

    let response = harness.user_get("/v1/entitlements").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let owned = body["entitlements"].as_array().unwrap();
    assert_eq!(owned.len(), 2);

    let titles: Vec<&str> = owned
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert!(titles.contains(&"First"));
    assert!(titles.contains(&"Second"));
}

// ============================================================================
// Manual balance changes
// ============================================================================

#[tokio::test]
async fn admin_credit_is_idempotent_by_reference() {
    let harness = TestHarness::new();
    harness.seed_account(0).await;
    let request = json!({
        "user_id": harness.test_user_id.to_string(),
        "amount_coins": 15,
        "reference_id": "support-1234",
        "description": "Goodwill"
    });

    let response = harness.admin_post("/v1/admin/credits").json(&request).await;
    response.assert_status_ok();
    let first: serde_json::Value = response.json();
    assert_eq!(first["already_applied"], false);
    assert_eq!(first["balance_coins"], 15);

    let response = harness.admin_post("/v1/admin/credits").json(&request).await;
    response.assert_status_ok();
    let second: serde_json::Value = response.json();
    assert_eq!(second["already_applied"], true);
    assert_eq!(second["entry_id"], first["entry_id"]);

    assert_eq!(harness.balance(harness.test_user_id).await, 15);
}

#[tokio::test]
async fn admin_credit_to_unknown_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .admin_post("/v1/admin/credits")
        .json(&json!({
            "user_id": promptmart_core::UserId::generate().to_string(),
            "amount_coins": 15,
            "reference_id": "support-1",
            "description": "Goodwill"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_credit_that_would_overflow_is_bad_request() {
    let harness = TestHarness::new();
    harness.seed_account(i64::MAX - 10).await;

    let response = harness
        .admin_post("/v1/admin/credits")
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount_coins": 100,
            "reference_id": "support-overflow",
            "description": "Goodwill"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.balance(harness.test_user_id).await, i64::MAX - 10);
}

#[tokio::test]
async fn admin_debit_respects_balance() {
    let harness = TestHarness::new();
    harness.seed_account(30).await;
    let debit = |amount: i64| {
        json!({
            "user_id": harness.test_user_id.to_string(),
            "amount_coins": amount,
            "description": "Chargeback"
        })
    };

    let response = harness.admin_post("/v1/admin/debits").json(&debit(50)).await;
    assert_eq!(response.status_code(), StatusCode::PAYMENT_REQUIRED);

    let response = harness.admin_post("/v1/admin/debits").json(&debit(20)).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance_coins"], 10);

    let response = harness.user_get("/v1/credits/ledger").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["entries"][0]["reason"], "adjustment");
    assert_eq!(body["entries"][0]["delta_coins"], -20);
}

#[tokio::test]
async fn admin_rejects_non_positive_amounts() {
    let harness = TestHarness::new();
    harness.seed_account(30).await;

    let response = harness
        .admin_post("/v1/admin/debits")
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount_coins": 0,
            "description": "Nothing"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}
