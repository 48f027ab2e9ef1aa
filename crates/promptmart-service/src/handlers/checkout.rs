//! Coin packages and Stripe Checkout handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use promptmart_core::{find_package, CoinPackage, COIN_PACKAGES};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Package catalog response.
#[derive(Debug, Serialize)]
pub struct PackagesResponse {
    /// Purchasable coin packages.
    pub packages: Vec<CoinPackage>,
    /// Currency of `price_minor`.
    pub currency: String,
}

/// List coin packages.
pub async fn list_packages(State(state): State<Arc<AppState>>) -> Json<PackagesResponse> {
    Json(PackagesResponse {
        packages: COIN_PACKAGES.to_vec(),
        currency: state.config.stripe_currency.clone(),
    })
}

/// Checkout request.
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Package to buy.
    pub package_id: String,
}

/// Checkout response.
#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    /// Session ID for polling.
    pub session_id: String,
    /// Stripe checkout session URL.
    pub checkout_url: String,
}

/// Start a Stripe Checkout for a coin package.
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, ApiError> {
    let package = find_package(&body.package_id)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown package: {}", body.package_id)))?;

    // Verify Stripe is configured
    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("Stripe not configured".into()))?;

    // Credits for users without an account could only be applied manually
    state.ledger.balance(auth.user_id).await?;

    let success_url = format!(
        "{}/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
        state.config.frontend_url
    );
    let cancel_url = format!("{}/buy-coins?canceled=true", state.config.frontend_url);

    let session = stripe
        .create_checkout_session(&auth.user_id, package, &success_url, &cancel_url)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create Stripe checkout session");
            ApiError::ExternalService(format!("Failed to create checkout session: {e}"))
        })?;

    let checkout_url = session
        .url
        .ok_or_else(|| ApiError::ExternalService("Stripe returned no checkout URL".into()))?;

    tracing::info!(
        user_id = %auth.user_id,
        package_id = %package.id,
        session_id = %session.id,
        "Stripe checkout session created"
    );

    Ok(Json(CreateCheckoutResponse {
        session_id: session.id,
        checkout_url,
    }))
}

/// Checkout status response.
#[derive(Debug, Serialize)]
pub struct CheckoutStatusResponse {
    /// Session ID.
    pub session_id: String,
    /// Whether the payment has been credited.
    pub credited: bool,
    /// Coins credited for this session (0 until credited).
    pub credited_coins: i64,
    /// Current balance.
    pub balance: i64,
    /// Stripe payment status, when looked up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
}

/// Poll whether a checkout session has been credited.
///
/// Crediting happens only through the webhook; this endpoint reads the
/// ledger and can be polled any number of times.
pub async fn checkout_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<CheckoutStatusResponse>, ApiError> {
    let balance = state.ledger.balance(auth.user_id).await?;

    let credit = state.ledger.credit_for_reference(&session_id).await?;

    if let Some(entry) = credit {
        if entry.user_id != auth.user_id {
            return Err(ApiError::NotFound("Checkout session not found".into()));
        }
        return Ok(Json(CheckoutStatusResponse {
            session_id,
            credited: true,
            credited_coins: entry.amount_coins(),
            balance,
            payment_status: Some("paid".into()),
        }));
    }

    // Not credited yet; report what Stripe knows when we can ask
    let payment_status = match &state.stripe {
        Some(stripe) => match stripe.get_checkout_session(&session_id).await {
            Ok(session) => {
                let owner = session
                    .metadata_str("user_id")
                    .or(session.client_reference_id.as_deref());
                if owner != Some(auth.user_id.to_string().as_str()) {
                    return Err(ApiError::NotFound("Checkout session not found".into()));
                }
                session.payment_status
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Checkout session lookup failed");
                None
            }
        },
        None => None,
    };

    Ok(Json(CheckoutStatusResponse {
        session_id,
        credited: false,
        credited_coins: 0,
        balance,
        payment_status,
    }))
}
