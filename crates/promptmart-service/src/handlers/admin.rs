//! Operator endpoints: catalog management and balance remediation.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use promptmart_core::{EntryId, Item, LedgerEntry, NewItem, UserId};
use promptmart_store::Store;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::items::ItemSummary;
use crate::ledger::LedgerError;
use crate::state::AppState;

/// Add an item to the catalog.
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<NewItem>,
) -> Result<Json<ItemSummary>, ApiError> {
    let item = Item::create(body)?;

    state.store.put_item(&item).await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        item_id = %item.item_id,
        price = item.price_coins,
        "Catalog item created"
    );

    Ok(Json(ItemSummary::from(&item)))
}

/// Manual credit request.
#[derive(Debug, Deserialize)]
pub struct AdminCreditRequest {
    /// Account to credit.
    pub user_id: String,
    /// Coins to add.
    pub amount_coins: i64,
    /// Unique reference; for a stranded payment, the checkout session id.
    pub reference_id: String,
    /// Reason for the credit.
    pub description: String,
}

/// Manual debit request.
#[derive(Debug, Deserialize)]
pub struct AdminDebitRequest {
    /// Account to debit.
    pub user_id: String,
    /// Coins to remove.
    pub amount_coins: i64,
    /// Free-form reference (ticket id, ...).
    #[serde(default)]
    pub reference_id: Option<String>,
    /// Reason for the debit.
    pub description: String,
}

/// Balance change response.
#[derive(Debug, Serialize)]
pub struct AdjustmentResponse {
    /// Ledger entry of the change.
    pub entry_id: String,
    /// Balance after the change.
    pub balance_coins: i64,
    /// The reference had been credited before; nothing was changed.
    pub already_applied: bool,
}

impl AdjustmentResponse {
    fn new(entry: &LedgerEntry, already_applied: bool) -> Self {
        Self {
            entry_id: entry.entry_id.to_string(),
            balance_coins: entry.balance_after_coins,
            already_applied,
        }
    }
}

/// Credit an account by hand, e.g. after an `UnknownUser` webhook.
///
/// Idempotent by `reference_id`: repeating the request returns the entry
/// written the first time.
pub async fn credit_account(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AdminCreditRequest>,
) -> Result<Json<AdjustmentResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let reference_id = body.reference_id.trim();
    if reference_id.is_empty() {
        return Err(ApiError::BadRequest("reference_id must not be empty".into()));
    }

    if let Some(existing) = state.ledger.credit_for_reference(reference_id).await? {
        return previously_applied(&existing, user_id);
    }

    let metadata = serde_json::json!({ "admin_id": admin.admin_id });
    match state
        .ledger
        .credit(
            user_id,
            body.amount_coins,
            reference_id,
            body.description.as_str(),
            metadata,
        )
        .await
    {
        Ok(entry) => {
            tracing::info!(
                admin_id = %admin.admin_id,
                user_id = %user_id,
                amount = body.amount_coins,
                reference_id = %reference_id,
                "Manual credit applied"
            );
            Ok(Json(AdjustmentResponse::new(&entry, false)))
        }
        Err(LedgerError::DuplicateReference(_)) => {
            let existing = state
                .ledger
                .credit_for_reference(reference_id)
                .await?
                .ok_or_else(|| ApiError::Conflict(format!("reference {reference_id} in use")))?;
            previously_applied(&existing, user_id)
        }
        Err(err) => Err(err.into()),
    }
}

/// Debit an account by hand. Recorded with the `adjustment` reason.
pub async fn debit_account(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AdminDebitRequest>,
) -> Result<Json<AdjustmentResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let reference_id = body
        .reference_id
        .unwrap_or_else(|| format!("admin:{}", EntryId::generate()));

    let entry = state
        .ledger
        .debit(user_id, body.amount_coins, reference_id, body.description)
        .await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        amount = body.amount_coins,
        balance = entry.balance_after_coins,
        "Manual debit applied"
    );

    Ok(Json(AdjustmentResponse::new(&entry, false)))
}

fn previously_applied(
    existing: &LedgerEntry,
    user_id: UserId,
) -> Result<Json<AdjustmentResponse>, ApiError> {
    if existing.user_id != user_id {
        return Err(ApiError::Conflict(format!(
            "reference {} already credited to another account",
            existing.reference_id
        )));
    }
    Ok(Json(AdjustmentResponse::new(existing, true)))
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))
}
