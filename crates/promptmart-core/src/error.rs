//! Error types for promptmart core types.

use crate::ids::IdError;

/// Result type for core validation.
pub type Result<T> = std::result::Result<T, MarketError>;

/// Errors raised while validating marketplace values.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// A coin amount was zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Applying the amount would overflow a coin counter.
    #[error("amount {0} would overflow the account balance")]
    BalanceOverflow(i64),

    /// An item failed validation.
    #[error("invalid item: {0}")]
    InvalidItem(String),

    /// No coin package with this identifier exists.
    #[error("unknown package: {0}")]
    UnknownPackage(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
