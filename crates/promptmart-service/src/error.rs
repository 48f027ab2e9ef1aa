//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use promptmart_core::MarketError;
use promptmart_store::StoreError;

use crate::ledger::LedgerError;
use crate::purchase::PurchaseError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The user already owns the item.
    #[error("already owned: {0}")]
    AlreadyOwned(String),

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Webhook signature rejected.
    #[error("bad signature: {0}")]
    BadSignature(String),

    /// Webhook payload unusable.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Storage momentarily unavailable; the request may be retried.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::AlreadyOwned(msg) => (StatusCode::CONFLICT, "already_owned", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::BadSignature(msg) => (
                StatusCode::BAD_REQUEST,
                "bad_signature",
                msg.clone(),
                None,
            ),
            Self::MalformedEvent(msg) => (
                StatusCode::BAD_REQUEST,
                "malformed_event",
                msg.clone(),
                None,
            ),
            Self::Transient(msg) => {
                tracing::warn!(error = %msg, "Transient storage failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "transient",
                    "Temporarily unavailable, retry the request".to_string(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::AlreadyExists { entity, id } => {
                Self::Conflict(format!("{entity} already exists: {id}"))
            }
            StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            StoreError::AlreadyOwned { user_id, item_id } => {
                Self::AlreadyOwned(format!("item {item_id} already owned by {user_id}"))
            }
            StoreError::DuplicateEvent { event_id } => {
                Self::Conflict(format!("event {event_id} already processed"))
            }
            StoreError::BalanceOverflow { amount, .. } => {
                Self::BadRequest(format!("amount {amount} would overflow the balance"))
            }
            StoreError::Transient(msg) => Self::Transient(msg),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount(amount) => {
                Self::BadRequest(format!("amount must be positive, got {amount}"))
            }
            LedgerError::AccountNotFound(user_id) => {
                Self::NotFound(format!("account not found: {user_id}"))
            }
            LedgerError::InsufficientFunds { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            LedgerError::BalanceOverflow(amount) => {
                Self::BadRequest(format!("amount {amount} would overflow the balance"))
            }
            LedgerError::DuplicateReference(reference) => {
                Self::Conflict(format!("reference {reference} already credited"))
            }
            LedgerError::Transient(msg) => Self::Transient(msg),
            LedgerError::Storage(msg) => Self::Internal(msg),
        }
    }
}

impl From<PurchaseError> for ApiError {
    fn from(err: PurchaseError) -> Self {
        match err {
            PurchaseError::ItemNotFound(item_id) => Self::NotFound(format!("item not found: {item_id}")),
            PurchaseError::AccountNotFound(user_id) => {
                Self::NotFound(format!("account not found: {user_id}"))
            }
            PurchaseError::AlreadyOwned { item_id, .. } => {
                Self::AlreadyOwned(format!("you already own item {item_id}"))
            }
            PurchaseError::InsufficientFunds { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            PurchaseError::Transient(msg) => Self::Transient(msg),
            PurchaseError::Storage(msg) => Self::Internal(msg),
        }
    }
}

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        Self::BadRequest(err.to_string())
    }
}
