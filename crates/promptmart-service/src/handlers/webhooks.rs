//! Stripe webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::reconcile::{ReconcileError, ReconcileOutcome};
use crate::state::AppState;

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
    /// `credited`, `already_processed`, `ignored` or `unknown_user`.
    pub status: &'static str,
}

impl WebhookResponse {
    fn ack(status: &'static str) -> Response {
        Json(Self {
            received: true,
            status,
        })
        .into_response()
    }
}

/// Handle Stripe webhooks.
///
/// Every verified delivery is acknowledged with 200 so Stripe stops
/// redelivering; only transient storage failures ask for a retry.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    match state.reconciler.reconcile(&body, signature).await {
        Ok(ReconcileOutcome::Credited {
            event_id,
            user_id,
            amount,
            balance,
        }) => {
            tracing::info!(
                event_id = %event_id,
                user_id = %user_id,
                amount,
                balance,
                "Stripe payment credited"
            );
            WebhookResponse::ack("credited")
        }
        Ok(ReconcileOutcome::Ignored { reason }) => {
            tracing::debug!(reason = %reason, "Stripe webhook ignored");
            WebhookResponse::ack("ignored")
        }
        Err(ReconcileError::AlreadyProcessed { .. }) => WebhookResponse::ack("already_processed"),
        // Logged for remediation by the reconciler; a retry would fail the same way
        Err(ReconcileError::UnknownUser { .. }) => WebhookResponse::ack("unknown_user"),
        Err(ReconcileError::BadSignature(msg)) => ApiError::BadSignature(msg).into_response(),
        Err(ReconcileError::MalformedEvent(msg)) => {
            tracing::warn!(error = %msg, "Malformed Stripe webhook");
            ApiError::MalformedEvent(msg).into_response()
        }
        Err(err @ (ReconcileError::Transient(_) | ReconcileError::Storage(_))) => {
            tracing::error!(error = %err, "Stripe webhook failed, awaiting redelivery");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "received": false,
                    "error": { "code": "retry", "message": "Processing failed, retry later" }
                })),
            )
                .into_response()
        }
    }
}
