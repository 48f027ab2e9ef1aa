//! Error types for promptmart storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation could not complete this time (lock timeout, serialization
    /// failure, pool exhaustion). Nothing was written; retrying is safe.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Conflicting identifier.
        id: String,
    },

    /// Balance too low for a debit.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Balance at the time of the attempt.
        balance: i64,
        /// Coins the debit needed.
        required: i64,
    },

    /// The user already holds an entitlement for this item.
    #[error("item {item_id} already owned by {user_id}")]
    AlreadyOwned {
        /// The buyer.
        user_id: String,
        /// The item.
        item_id: String,
    },

    /// The change would push a coin counter out of range. Nothing was written.
    #[error("amount {amount} would overflow the balance of {user_id}")]
    BalanceOverflow {
        /// The account.
        user_id: String,
        /// Coins the change carried.
        amount: i64,
    },

    /// A credit with this reference was already applied.
    #[error("duplicate event: {event_id}")]
    DuplicateEvent {
        /// The credit reference.
        event_id: String,
    },
}

impl StoreError {
    /// Whether the failure left no trace and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub(crate) fn account_not_found(user_id: impl ToString) -> Self {
        Self::NotFound {
            entity: "account",
            id: user_id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected, lock_not_available
                Some("40001" | "40P01" | "55P03") => Self::Transient(err.to_string()),
                _ => Self::Database(err.to_string()),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Transient(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Serialization(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(StoreError::Transient("lock timeout".into()).is_transient());
        assert!(!StoreError::Database("disk full".into()).is_transient());
        assert!(!StoreError::InsufficientCredits {
            balance: 1,
            required: 2
        }
        .is_transient());
    }

    #[test]
    fn pool_timeouts_are_transient() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
    }
}
