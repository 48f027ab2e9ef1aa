//! Stripe integration.
//!
//! Stripe handles:
//! - Coin package purchases via Checkout
//! - Webhook delivery of completed payments

pub mod client;
pub mod types;
pub mod webhook;

pub use client::StripeClient;
pub use client::StripeError;
pub use types::*;
pub use webhook::{sign_payload, verify_signature, SignatureError};
