//! Ledger entries: the append-only audit trail of balance changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, ItemId, UserId};

/// A single balance change.
///
/// Every mutation of an account balance writes exactly one entry in the same
/// atomic unit as the mutation. Entries are never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry ID (ULID, time-ordered).
    pub entry_id: EntryId,

    /// The account that changed.
    pub user_id: UserId,

    /// Signed change in coins. Positive = credit, negative = debit.
    pub delta_coins: i64,

    /// Why the balance changed.
    pub reason: LedgerReason,

    /// The item id for purchases, the payment event id for credits.
    pub reference_id: String,

    /// Balance after the change. Filled in by the store inside the
    /// transaction that applies it.
    pub balance_after_coins: i64,

    /// Human-readable description.
    pub description: String,

    /// Extra context (package id, item title, ...).
    pub metadata: serde_json::Value,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(
        user_id: UserId,
        delta_coins: i64,
        reason: LedgerReason,
        reference_id: String,
        description: String,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            entry_id: EntryId::generate(),
            user_id,
            delta_coins,
            reason,
            reference_id,
            balance_after_coins: 0,
            description,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Debit entry for buying an item.
    #[must_use]
    pub fn purchase(user_id: UserId, item_id: ItemId, price_coins: i64, title: &str) -> Self {
        Self::new(
            user_id,
            -price_coins.abs(),
            LedgerReason::Purchase,
            item_id.to_string(),
            format!("Unlocked \"{title}\""),
            serde_json::json!({ "item_title": title }),
        )
    }

    /// Credit entry; `reference_id` must be unique across all credits.
    #[must_use]
    pub fn credit(
        user_id: UserId,
        amount_coins: i64,
        reference_id: impl Into<String>,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::new(
            user_id,
            amount_coins.abs(),
            LedgerReason::Credit,
            reference_id.into(),
            description.into(),
            metadata,
        )
    }

    /// Operator debit outside of a purchase.
    #[must_use]
    pub fn adjustment(
        user_id: UserId,
        amount_coins: i64,
        reference_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            user_id,
            -amount_coins.abs(),
            LedgerReason::Adjustment,
            reference_id.into(),
            description.into(),
            serde_json::Value::Null,
        )
    }

    /// Magnitude of the change.
    #[must_use]
    pub fn amount_coins(&self) -> i64 {
        self.delta_coins.abs()
    }

    /// Set the post-change balance.
    #[must_use]
    pub fn with_balance_after(mut self, balance_after_coins: i64) -> Self {
        self.balance_after_coins = balance_after_coins;
        self
    }
}

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Coins spent unlocking an item.
    Purchase,
    /// Coins bought through the payment gateway or granted by an operator.
    Credit,
    /// Operator debit.
    Adjustment,
}

impl LedgerReason {
    /// Stable lowercase name used in storage and responses.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Credit => "credit",
            Self::Adjustment => "adjustment",
        }
    }

    /// Parse the name produced by [`LedgerReason::as_str`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "purchase" => Some(Self::Purchase),
            "credit" => Some(Self::Credit),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }
}
