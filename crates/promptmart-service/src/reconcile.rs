//! Payment reconciliation: verified Stripe events become idempotent credits.
//!
//! The gateway delivers at least once. The checkout session id is the
//! idempotency key; the ledger's credit reference uniqueness turns every
//! redelivery, concurrent or not, into [`ReconcileError::AlreadyProcessed`].

use std::time::Duration;

use promptmart_core::{find_package, PaymentEvent, UserId};

use crate::ledger::{Ledger, LedgerError};
use crate::stripe::{verify_signature, CheckoutSession, WebhookEvent};

/// Event types that carry a completed payment.
const CREDIT_EVENT_TYPES: [&str; 2] = [
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
];

/// A webhook that was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The payment was credited.
    Credited {
        /// Checkout session id.
        event_id: String,
        /// Credited account.
        user_id: UserId,
        /// Coins credited.
        amount: i64,
        /// Balance after the credit.
        balance: i64,
    },
    /// A verified event that carries nothing to credit.
    Ignored {
        /// Why it was skipped.
        reason: String,
    },
}

/// Why a webhook was not credited.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Signature missing, invalid or stale, or no secret configured.
    #[error("bad signature: {0}")]
    BadSignature(String),

    /// The payload could not be turned into a payment event.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The event was credited before. Terminal, benign.
    #[error("event already processed: {event_id}")]
    AlreadyProcessed {
        /// Checkout session id.
        event_id: String,
    },

    /// The paying user has no account. Needs operator remediation.
    #[error("unknown user {user_id} for event {event_id}")]
    UnknownUser {
        /// Checkout session id.
        event_id: String,
        /// The user named in the event.
        user_id: UserId,
        /// Coins that were not credited.
        amount: i64,
    },

    /// Storage was momentarily unavailable; the gateway should redeliver.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ReconcileError {
    /// Whether a redelivery may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Turns signed webhook payloads into ledger credits.
#[derive(Clone)]
pub struct CreditReconciler {
    ledger: Ledger,
    webhook_secret: Option<String>,
    tolerance: Duration,
}

impl CreditReconciler {
    /// Create a reconciler. Without a secret every webhook is rejected.
    #[must_use]
    pub fn new(ledger: Ledger, webhook_secret: Option<String>, tolerance: Duration) -> Self {
        Self {
            ledger,
            webhook_secret,
            tolerance,
        }
    }

    /// Verify, parse and credit one delivery.
    pub async fn reconcile(
        &self,
        payload: &str,
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.verify(payload, signature)?;

        let event: WebhookEvent = serde_json::from_str(payload)
            .map_err(|e| ReconcileError::MalformedEvent(e.to_string()))?;

        let Some(payment) = payment_event(&event)? else {
            tracing::debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Ignoring Stripe event"
            );
            return Ok(ReconcileOutcome::Ignored {
                reason: format!("nothing to credit for {}", event.event_type),
            });
        };

        self.credit(&event, payment).await
    }

    fn verify(&self, payload: &str, signature: Option<&str>) -> Result<(), ReconcileError> {
        let Some(secret) = self.webhook_secret.as_deref() else {
            tracing::warn!("Stripe webhook secret not configured - rejecting webhook");
            return Err(ReconcileError::BadSignature(
                "webhook secret not configured".into(),
            ));
        };
        let signature = signature.ok_or_else(|| {
            tracing::warn!("Stripe webhook without signature header");
            ReconcileError::BadSignature("missing signature header".into())
        })?;

        verify_signature(
            payload,
            signature,
            secret,
            self.tolerance,
            chrono::Utc::now().timestamp(),
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid Stripe webhook signature");
            ReconcileError::BadSignature(e.to_string())
        })
    }

    async fn credit(
        &self,
        event: &WebhookEvent,
        payment: PaymentEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let PaymentEvent {
            event_id,
            user_id,
            credit_amount,
            package_id,
        } = payment;

        let already = self
            .ledger
            .credit_for_reference(&event_id)
            .await
            .map_err(storage_error)?;
        if already.is_some() {
            tracing::info!(event_id = %event_id, "Payment already credited");
            return Err(ReconcileError::AlreadyProcessed { event_id });
        }

        let description = find_package(&package_id)
            .map_or_else(|| format!("{credit_amount} coins"), |p| p.name.to_string());
        let metadata = serde_json::json!({
            "package_id": package_id,
            "stripe_event_id": event.id,
            "amount_total": event.data.object.get("amount_total"),
            "currency": event.data.object.get("currency"),
        });

        match self
            .ledger
            .credit(user_id, credit_amount, &event_id, description, metadata)
            .await
        {
            Ok(entry) => Ok(ReconcileOutcome::Credited {
                event_id,
                user_id,
                amount: credit_amount,
                balance: entry.balance_after_coins,
            }),
            Err(LedgerError::DuplicateReference(_)) => {
                tracing::info!(event_id = %event_id, "Payment credited by a concurrent delivery");
                Err(ReconcileError::AlreadyProcessed { event_id })
            }
            Err(LedgerError::AccountNotFound(_)) => {
                tracing::error!(
                    event_id = %event_id,
                    user_id = %user_id,
                    amount = credit_amount,
                    package_id = %package_id,
                    "Paid checkout for unknown user - credit manually"
                );
                Err(ReconcileError::UnknownUser {
                    event_id,
                    user_id,
                    amount: credit_amount,
                })
            }
            Err(LedgerError::BalanceOverflow(amount)) => {
                tracing::error!(
                    event_id = %event_id,
                    user_id = %user_id,
                    amount,
                    "Payment amount would overflow the balance"
                );
                Err(ReconcileError::MalformedEvent(format!(
                    "coins {amount} would overflow the balance"
                )))
            }
            Err(err) => Err(storage_error(err)),
        }
    }
}

fn storage_error(err: LedgerError) -> ReconcileError {
    if err.is_transient() {
        ReconcileError::Transient(err.to_string())
    } else {
        ReconcileError::Storage(err.to_string())
    }
}

/// Extract the payment from a checkout event.
///
/// Returns `Ok(None)` for event types that carry no payment and for sessions
/// that are not paid yet.
fn payment_event(event: &WebhookEvent) -> Result<Option<PaymentEvent>, ReconcileError> {
    if !CREDIT_EVENT_TYPES.contains(&event.event_type.as_str()) {
        return Ok(None);
    }

    let session: CheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| ReconcileError::MalformedEvent(format!("checkout session: {e}")))?;

    if !session.is_paid() {
        tracing::info!(
            session_id = %session.id,
            payment_status = ?session.payment_status,
            "Checkout session not paid yet, skipping"
        );
        return Ok(None);
    }

    let user_id = session
        .metadata_str("user_id")
        .or(session.client_reference_id.as_deref())
        .ok_or_else(|| ReconcileError::MalformedEvent("missing user_id".into()))?
        .parse::<UserId>()
        .map_err(|e| ReconcileError::MalformedEvent(format!("user_id: {e}")))?;

    let credit_amount = session
        .metadata_str("coins")
        .ok_or_else(|| ReconcileError::MalformedEvent("missing coins".into()))?
        .parse::<i64>()
        .ok()
        .filter(|coins| *coins > 0)
        .ok_or_else(|| ReconcileError::MalformedEvent("coins must be a positive integer".into()))?;

    let package_id = session
        .metadata_str("package_id")
        .ok_or_else(|| ReconcileError::MalformedEvent("missing package_id".into()))?
        .to_string();

    Ok(Some(PaymentEvent {
        event_id: session.id,
        user_id,
        credit_amount,
        package_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripe::sign_payload;
    use promptmart_core::Account;
    use promptmart_store::{RocksStore, Store};
    use std::sync::Arc;
    use tempfile::TempDir;

    const SECRET: &str = "whsec_reconcile";

    struct Fixture {
        store: Arc<RocksStore>,
        reconciler: CreditReconciler,
        _dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = Arc::new(RocksStore::open(dir.path()).unwrap());
            let reconciler = CreditReconciler::new(
                Ledger::new(store.clone()),
                Some(SECRET.into()),
                Duration::from_secs(300),
            );
            Self {
                store,
                reconciler,
                _dir: dir,
            }
        }

        async fn user(&self) -> UserId {
            let user_id = UserId::generate();
            self.store.create_account(&Account::new(user_id)).await.unwrap();
            user_id
        }

        async fn balance(&self, user_id: UserId) -> i64 {
            self.store
                .get_account(&user_id)
                .await
                .unwrap()
                .unwrap()
                .balance_coins
        }
    }

    fn checkout_event(session_id: &str, user_id: UserId, coins: i64, status: &str) -> String {
        serde_json::json!({
            "id": format!("evt_{session_id}"),
            "type": "checkout.session.completed",
            "created": 1_700_000_000,
            "data": { "object": {
                "id": session_id,
                "object": "checkout.session",
                "payment_status": status,
                "amount_total": 19_900,
                "currency": "inr",
                "client_reference_id": user_id.to_string(),
                "metadata": {
                    "user_id": user_id.to_string(),
                    "package_id": "popular",
                    "coins": coins.to_string(),
                }
            }}
        })
        .to_string()
    }

    fn sign(payload: &str) -> String {
        sign_payload(payload, SECRET, chrono::Utc::now().timestamp())
    }

    #[tokio::test]
    async fn scenario_d_duplicate_delivery_credits_once() {
        let fx = Fixture::new();
        let user_id = fx.user().await;
        let payload = checkout_event("cs_evt", user_id, 50, "paid");
        let header = sign(&payload);

        let first = fx.reconciler.reconcile(&payload, Some(&header)).await.unwrap();
        assert_eq!(
            first,
            ReconcileOutcome::Credited {
                event_id: "cs_evt".into(),
                user_id,
                amount: 50,
                balance: 50,
            }
        );

        let second = fx.reconciler.reconcile(&payload, Some(&header)).await;
        assert!(matches!(
            second,
            Err(ReconcileError::AlreadyProcessed { ref event_id }) if event_id == "cs_evt"
        ));
        assert_eq!(fx.balance(user_id).await, 50);

        let entry = fx.store.get_credit_entry("cs_evt").await.unwrap().unwrap();
        assert_eq!(entry.metadata["package_id"], "popular");
        assert_eq!(entry.metadata["stripe_event_id"], "evt_cs_evt");
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_credit() {
        let fx = Fixture::new();
        let user_id = fx.user().await;
        let payload = checkout_event("cs_bad", user_id, 50, "paid");
        let forged = sign_payload(&payload, "whsec_attacker", chrono::Utc::now().timestamp());

        let result = fx.reconciler.reconcile(&payload, Some(&forged)).await;
        assert!(matches!(result, Err(ReconcileError::BadSignature(_))));

        let result = fx.reconciler.reconcile(&payload, None).await;
        assert!(matches!(result, Err(ReconcileError::BadSignature(_))));

        assert_eq!(fx.balance(user_id).await, 0);
    }

    #[tokio::test]
    async fn missing_secret_rejects_everything() {
        let fx = Fixture::new();
        let user_id = fx.user().await;
        let reconciler = CreditReconciler::new(
            Ledger::new(fx.store.clone()),
            None,
            Duration::from_secs(300),
        );
        let payload = checkout_event("cs_nosecret", user_id, 50, "paid");

        let result = reconciler.reconcile(&payload, Some(&sign(&payload))).await;
        assert!(matches!(result, Err(ReconcileError::BadSignature(_))));
        assert_eq!(fx.balance(user_id).await, 0);
    }

    #[tokio::test]
    async fn malformed_payloads() {
        let fx = Fixture::new();
        let user_id = fx.user().await;

        let not_json = "{not json";
        let result = fx.reconciler.reconcile(not_json, Some(&sign(not_json))).await;
        assert!(matches!(result, Err(ReconcileError::MalformedEvent(_))));

        let zero = checkout_event("cs_zero", user_id, 0, "paid");
        let result = fx.reconciler.reconcile(&zero, Some(&sign(&zero))).await;
        assert!(matches!(result, Err(ReconcileError::MalformedEvent(_))));

        let no_user = serde_json::json!({
            "id": "evt_x",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_x",
                "payment_status": "paid",
                "metadata": { "coins": "20", "package_id": "starter" }
            }}
        })
        .to_string();
        let result = fx.reconciler.reconcile(&no_user, Some(&sign(&no_user))).await;
        assert!(matches!(result, Err(ReconcileError::MalformedEvent(_))));
    }

    #[tokio::test]
    async fn unpaid_and_unrelated_events_are_ignored() {
        let fx = Fixture::new();
        let user_id = fx.user().await;

        let unpaid = checkout_event("cs_unpaid", user_id, 50, "unpaid");
        let outcome = fx.reconciler.reconcile(&unpaid, Some(&sign(&unpaid))).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Ignored { .. }));

        let other = r#"{"id":"evt_pi","type":"payment_intent.created","data":{"object":{}}}"#;
        let outcome = fx.reconciler.reconcile(other, Some(&sign(other))).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Ignored { .. }));

        assert_eq!(fx.balance(user_id).await, 0);
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let fx = Fixture::new();
        let ghost = UserId::generate();
        let payload = checkout_event("cs_ghost", ghost, 20, "paid");

        let result = fx.reconciler.reconcile(&payload, Some(&sign(&payload))).await;
        assert!(matches!(
            result,
            Err(ReconcileError::UnknownUser { amount: 20, .. })
        ));
        assert!(fx.store.get_credit_entry("cs_ghost").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redeliveries_credit_once() {
        let fx = Fixture::new();
        let user_id = fx.user().await;
        let payload = checkout_event("cs_race", user_id, 50, "paid");
        let header = sign(&payload);

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let reconciler = fx.reconciler.clone();
                let payload = payload.clone();
                let header = header.clone();
                tokio::spawn(async move { reconciler.reconcile(&payload, Some(&header)).await })
            })
            .collect();

        let mut credited = 0;
        let mut processed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(ReconcileOutcome::Credited { .. }) => credited += 1,
                Err(ReconcileError::AlreadyProcessed { .. }) => processed += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        assert_eq!(credited, 1);
        assert_eq!(processed, 5);
        assert_eq!(fx.balance(user_id).await, 50);
    }
}
