//! Promptmart HTTP API service.
//!
//! This crate provides the marketplace's correctness core and the HTTP API in
//! front of it:
//!
//! - [`Ledger`]: atomic debit and credit, each with its audit entry
//! - [`PurchaseEngine`]: spend coins to unlock an item, exactly once
//! - [`CreditReconciler`]: verified Stripe webhooks to idempotent credits
//! - Stripe Checkout session creation for coin packages
//! - Catalog, entitlement and ledger queries
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **HS256 JWT bearer tokens** from the identity provider, for end users
//! 2. **Admin API key** (`X-Admin-Key`), for catalog and balance remediation
//!
//! Stripe webhooks are authenticated by their signature header.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod purchase;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{Ledger, LedgerError};
pub use purchase::{Purchase, PurchaseEngine, PurchaseError};
pub use reconcile::{CreditReconciler, ReconcileError, ReconcileOutcome};
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
