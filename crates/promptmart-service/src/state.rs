//! Application state.

use std::sync::Arc;

use promptmart_store::Store;

use crate::config::ServiceConfig;
use crate::ledger::Ledger;
use crate::purchase::PurchaseEngine;
use crate::reconcile::CreditReconciler;
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Debit and credit primitives.
    pub ledger: Ledger,

    /// Item purchases.
    pub purchases: PurchaseEngine,

    /// Webhook to credit reconciliation.
    pub reconciler: CreditReconciler,

    /// Stripe client for checkout sessions (optional).
    pub stripe: Option<Arc<StripeClient>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let ledger = Ledger::new(Arc::clone(&store));
        let purchases = PurchaseEngine::new(Arc::clone(&store));

        if config.stripe_webhook_secret.is_none() {
            tracing::warn!("Stripe webhook secret not configured - webhooks will be rejected");
        }
        let reconciler = CreditReconciler::new(
            ledger.clone(),
            config.stripe_webhook_secret.clone(),
            config.webhook_tolerance(),
        );

        // Create Stripe client if configured
        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::new(
                key,
                config.stripe_api_base.as_str(),
                config.stripe_currency.as_str(),
            ) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to build Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - checkout will not be available");
        }

        Self {
            store,
            config,
            ledger,
            purchases,
            reconciler,
            stripe,
        }
    }
}
