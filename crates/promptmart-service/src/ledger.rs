//! The ledger: atomic balance mutations with their audit entries.
//!
//! The ledger owns no state of its own. Every call goes to the store, whose
//! transaction applies the balance change and appends the entry together.

use std::sync::Arc;

use promptmart_core::{LedgerEntry, UserId};
use promptmart_store::{Store, StoreError};

/// Errors returned by [`Ledger`] operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Amounts must be positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// The user has no account.
    #[error("account not found: {0}")]
    AccountNotFound(UserId),

    /// The balance does not cover the debit. Nothing was written.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Balance at the time of the attempt.
        balance: i64,
        /// Coins the debit needed.
        required: i64,
    },

    /// The amount would push the balance out of range. Nothing was written.
    #[error("amount {0} would overflow the balance")]
    BalanceOverflow(i64),

    /// A credit with this reference was already applied.
    #[error("duplicate credit reference: {0}")]
    DuplicateReference(String),

    /// Storage was momentarily unavailable. Nothing was written.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Whether the caller may retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientFunds { balance, required }
            }
            StoreError::DuplicateEvent { event_id } => Self::DuplicateReference(event_id),
            StoreError::BalanceOverflow { amount, .. } => Self::BalanceOverflow(amount),
            StoreError::Transient(msg) => Self::Transient(msg),
            StoreError::NotFound { entity, id } => Self::Storage(format!("{entity} not found: {id}")),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Atomic debit and credit primitives.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Debit `amount` coins from `user_id` outside of a purchase.
    ///
    /// The balance check and the decrement are one atomic step: two
    /// concurrent debits can never both pass against a balance that only
    /// covers one of them.
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: i64,
        reference_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let entry = LedgerEntry::adjustment(user_id, amount, reference_id, description);
        let entry = self
            .store
            .debit(entry)
            .await
            .map_err(|e| account_error(e, user_id))?;

        tracing::info!(
            user_id = %user_id,
            amount,
            balance = entry.balance_after_coins,
            "Debited coins"
        );
        Ok(entry)
    }

    /// Credit `amount` coins to `user_id` under a unique `reference_id`.
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        reference_id: impl Into<String>,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let entry = LedgerEntry::credit(user_id, amount, reference_id, description, metadata);
        let entry = self
            .store
            .credit(entry)
            .await
            .map_err(|e| account_error(e, user_id))?;

        tracing::info!(
            user_id = %user_id,
            amount,
            reference_id = %entry.reference_id,
            balance = entry.balance_after_coins,
            "Credited coins"
        );
        Ok(entry)
    }

    /// Current balance, read from the store.
    pub async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError> {
        self.store
            .get_account(&user_id)
            .await?
            .map(|account| account.balance_coins)
            .ok_or(LedgerError::AccountNotFound(user_id))
    }

    /// Ledger entries for `user_id`, newest first.
    pub async fn history(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .store
            .list_ledger_entries(&user_id, limit, offset)
            .await?)
    }

    /// The credit applied under `reference_id`, if any.
    pub async fn credit_for_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.store.get_credit_entry(reference_id).await?)
    }
}

/// A store `NotFound` from a mutation always means the account is missing.
fn account_error(err: StoreError, user_id: UserId) -> LedgerError {
    match err {
        StoreError::NotFound { .. } => LedgerError::AccountNotFound(user_id),
        other => other.into(),
    }
}
