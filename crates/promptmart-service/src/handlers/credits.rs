//! Balance and ledger handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use promptmart_core::LedgerEntry;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Current balance in coins.
    pub balance_coins: i64,
}

/// Get current coin balance. Always read from the store.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance_coins = state.ledger.balance(auth.user_id).await?;

    Ok(Json(BalanceResponse { balance_coins }))
}

/// Ledger query parameters.
#[derive(Debug, Deserialize)]
pub struct ListLedgerQuery {
    /// Maximum number of entries to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// A ledger entry as returned to its owner.
#[derive(Debug, Serialize)]
pub struct LedgerEntryResponse {
    /// Entry ID.
    pub id: String,
    /// Signed change in coins.
    pub delta_coins: i64,
    /// `purchase`, `credit` or `adjustment`.
    pub reason: String,
    /// Item id or payment reference.
    pub reference_id: String,
    /// Balance after this entry.
    pub balance_after_coins: i64,
    /// Description.
    pub description: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&LedgerEntry> for LedgerEntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.entry_id.to_string(),
            delta_coins: entry.delta_coins,
            reason: entry.reason.as_str().to_string(),
            reference_id: entry.reference_id.clone(),
            balance_after_coins: entry.balance_after_coins,
            description: entry.description.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// Ledger list response.
#[derive(Debug, Serialize)]
pub struct ListLedgerResponse {
    /// Entries (newest first).
    pub entries: Vec<LedgerEntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List the current user's ledger.
pub async fn list_ledger(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListLedgerQuery>,
) -> Result<Json<ListLedgerResponse>, ApiError> {
    // Verify account exists
    state.ledger.balance(auth.user_id).await?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let entries = state
        .ledger
        .history(auth.user_id, limit + 1, query.offset)
        .await?;

    let has_more = entries.len() > limit;
    let entries: Vec<_> = entries
        .iter()
        .take(limit)
        .map(LedgerEntryResponse::from)
        .collect();

    Ok(Json(ListLedgerResponse { entries, has_more }))
}
