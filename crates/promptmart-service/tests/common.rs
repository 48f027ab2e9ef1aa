//! Common test utilities for promptmart integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::{TestRequest, TestServer};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tempfile::TempDir;

use promptmart_core::{Account, Item, NewItem, UserId};
use promptmart_service::stripe::sign_payload;
use promptmart_service::{create_router, AppState, ServiceConfig};
use promptmart_store::{RocksStore, Store};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store access for seeding and assertions.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A harness whose Stripe client talks to `api_base` (a mock server).
    pub fn with_stripe(api_base: &str) -> Self {
        Self::build(Some(api_base.to_string()))
    }

    fn build(stripe_api_base: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            auth_audience: "authenticated".into(),
            admin_api_key: Some(ADMIN_KEY.into()),
            stripe_api_key: stripe_api_base.as_ref().map(|_| "sk_test_harness".to_string()),
            stripe_api_base: stripe_api_base.unwrap_or_else(|| "http://127.0.0.1:9".into()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            ..ServiceConfig::default()
        };

        let state = AppState::new(store.clone(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            store,
            _temp_dir: temp_dir,
            test_user_id,
        }
    }

    /// Authorization header for the test user.
    pub fn user_auth(&self) -> (HeaderName, HeaderValue) {
        Self::auth_for(self.test_user_id)
    }

    /// Authorization header carrying a signed token for `user_id`.
    pub fn auth_for(user_id: UserId) -> (HeaderName, HeaderValue) {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "sub": user_id.to_string(),
            "aud": "authenticated",
            "exp": now + 3600,
            "iat": now,
        });
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to sign token");

        (
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {token}")).expect("valid header"),
        )
    }

    /// Admin key header.
    pub fn admin_auth() -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-admin-key"),
            HeaderValue::from_static(ADMIN_KEY),
        )
    }

    /// GET as the test user.
    pub fn user_get(&self, path: &str) -> TestRequest {
        let (name, value) = self.user_auth();
        self.server.get(path).add_header(name, value)
    }

    /// POST as the test user.
    pub fn user_post(&self, path: &str) -> TestRequest {
        let (name, value) = self.user_auth();
        self.server.post(path).add_header(name, value)
    }

    /// POST as `user_id`.
    pub fn post_as(&self, user_id: UserId, path: &str) -> TestRequest {
        let (name, value) = Self::auth_for(user_id);
        self.server.post(path).add_header(name, value)
    }

    /// POST with the admin key.
    pub fn admin_post(&self, path: &str) -> TestRequest {
        let (name, value) = Self::admin_auth();
        self.server.post(path).add_header(name, value)
    }

    /// POST a webhook payload with a valid signature.
    pub fn signed_webhook(&self, payload: &str) -> TestRequest {
        let (name, value) = stripe_signature(payload);
        self.server
            .post("/webhooks/stripe")
            .add_header(name, value)
            .text(payload)
    }

    /// Give the test user an account with `balance` coins.
    pub async fn seed_account(&self, balance: i64) {
        self.seed_account_for(self.test_user_id, balance).await;
    }

    /// Give `user_id` an account with `balance` coins.
    pub async fn seed_account_for(&self, user_id: UserId, balance: i64) {
        let mut account = Account::new(user_id);
        account.balance_coins = balance;
        self.store
            .create_account(&account)
            .await
            .expect("Failed to seed account");
    }

    /// Add an item priced at `price` coins to the catalog.
    pub async fn seed_item(&self, title: &str, price: i64) -> Item {
        let item = Item::create(NewItem {
            title: title.into(),
            description: format!("{title} description"),
            content: "Write a scene where the detective opens the letter and finds \
                      a photograph of herself taken that very morning"
                .into(),
            price_coins: price,
            category: "fiction".into(),
            ..Default::default()
        })
        .expect("valid item");
        self.store.put_item(&item).await.expect("Failed to seed item");
        item
    }

    /// Current balance straight from the store.
    pub async fn balance(&self, user_id: UserId) -> i64 {
        self.store
            .get_account(&user_id)
            .await
            .expect("store read")
            .expect("account exists")
            .balance_coins
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A `checkout.session.completed` event paying `coins` to `user_id`.
pub fn checkout_completed(session_id: &str, user_id: UserId, coins: i64) -> String {
    json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.completed",
        "created": chrono::Utc::now().timestamp(),
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "payment_status": "paid",
                "amount_total": 19900,
                "currency": "inr",
                "client_reference_id": user_id.to_string(),
                "metadata": {
                    "user_id": user_id.to_string(),
                    "package_id": "popular",
                    "coins": coins.to_string(),
                }
            }
        }
    })
    .to_string()
}

/// A valid `Stripe-Signature` header for `payload`.
pub fn stripe_signature(payload: &str) -> (HeaderName, HeaderValue) {
    signature_with_secret(payload, WEBHOOK_SECRET)
}

/// A `Stripe-Signature` header for `payload` signed with `secret`.
pub fn signature_with_secret(payload: &str, secret: &str) -> (HeaderName, HeaderValue) {
    let header = sign_payload(payload, secret, chrono::Utc::now().timestamp());
    (
        HeaderName::from_static("stripe-signature"),
        HeaderValue::from_str(&header).expect("valid header"),
    )
}
