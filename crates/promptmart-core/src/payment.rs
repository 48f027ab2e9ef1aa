//! Verified payment-completion events.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// A payment confirmed by the gateway, ready to be credited.
///
/// `event_id` is the gateway's checkout session id. It is the idempotency key:
/// however many times the gateway delivers the event, it is credited once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Gateway session identifier.
    pub event_id: String,
    /// The account to credit.
    pub user_id: UserId,
    /// Coins to credit. Always positive.
    pub credit_amount: i64,
    /// The package that was bought.
    pub package_id: String,
}
