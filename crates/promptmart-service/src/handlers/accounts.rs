//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use promptmart_core::Account;
use promptmart_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Current balance in coins.
    pub balance_coins: i64,
    /// Coins ever credited.
    pub lifetime_purchased_coins: i64,
    /// Coins ever spent.
    pub lifetime_spent_coins: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            balance_coins: account.balance_coins,
            lifetime_purchased_coins: account.lifetime_purchased_coins,
            lifetime_spent_coins: account.lifetime_spent_coins,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Register an account with a zero balance.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = Account::new(auth.user_id);

    // AlreadyExists surfaces as 409
    state.store.create_account(&account).await?;

    tracing::info!(user_id = %auth.user_id, "Account created");

    Ok(Json(AccountResponse::from(&account)))
}

/// Get the current user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&account)))
}
