//! Entitlements: durable proof that a user bought an item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ItemId, UserId};

/// A record that `user_id` owns `item_id`.
///
/// At most one entitlement exists per (user, item) pair. Entitlements are
/// created only by a successful purchase and are never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// The owner.
    pub user_id: UserId,
    /// The owned item.
    pub item_id: ItemId,
    /// Coins debited for the purchase.
    pub price_paid_coins: i64,
    /// When the purchase committed.
    pub granted_at: DateTime<Utc>,
}

impl Entitlement {
    /// Create an entitlement stamped with the current time.
    #[must_use]
    pub fn grant(user_id: UserId, item_id: ItemId, price_paid_coins: i64) -> Self {
        Self {
            user_id,
            item_id,
            price_paid_coins,
            granted_at: Utc::now(),
        }
    }
}
