//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, checkout, credits, health, items, webhooks};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/packages` - Coin package catalog
/// - `GET /v1/items` - Catalog summaries
///
/// ## Accounts and credits (JWT auth)
/// - `POST /v1/accounts` - Create account
/// - `GET /v1/accounts/me` - Get current user's account
/// - `GET /v1/credits/balance` - Get current balance
/// - `GET /v1/credits/ledger` - List ledger entries
///
/// ## Checkout (JWT auth)
/// - `POST /v1/checkout` - Start a Stripe Checkout for a package
/// - `GET /v1/checkout/:session_id` - Poll whether a session was credited
///
/// ## Items (JWT auth)
/// - `GET /v1/items/:item_id` - Item detail
/// - `POST /v1/items/:item_id/purchase` - Buy an item
/// - `GET /v1/entitlements` - Owned items
///
/// ## Admin (Admin API key)
/// - `POST /v1/admin/items` - Create catalog item
/// - `POST /v1/admin/credits` - Manual credit
/// - `POST /v1/admin/debits` - Manual debit
///
/// ## Webhooks (Signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Accounts
        .route("/v1/accounts", post(accounts::create_account))
        .route("/v1/accounts/me", get(accounts::get_account))
        // Credits
        .route("/v1/credits/balance", get(credits::get_balance))
        .route("/v1/credits/ledger", get(credits::list_ledger))
        // Packages and checkout
        .route("/v1/packages", get(checkout::list_packages))
        .route("/v1/checkout", post(checkout::create_checkout))
        .route("/v1/checkout/:session_id", get(checkout::checkout_status))
        // Catalog and ownership
        .route("/v1/items", get(items::list_items))
        .route("/v1/items/:item_id", get(items::get_item))
        .route("/v1/items/:item_id/purchase", post(items::purchase_item))
        .route("/v1/entitlements", get(items::list_entitlements))
        // Admin
        .route("/v1/admin/items", post(admin::create_item))
        .route("/v1/admin/credits", post(admin::credit_account))
        .route("/v1/admin/debits", post(admin::debit_account))
        // Webhooks
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
