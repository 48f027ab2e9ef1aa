//! Promptmart Client SDK.
//!
//! This crate provides a client library for front ends and tools that talk to
//! the promptmart API on behalf of a signed-in user.
//!
//! # Example
//!
//! ```no_run
//! use promptmart_client::{MarketplaceClient, PollOptions};
//!
//! # async fn example() -> Result<(), promptmart_client::ClientError> {
//! let client = MarketplaceClient::new("https://api.promptmart.app", "user-jwt")?;
//!
//! // Buy coins, then wait for the payment webhook to land
//! let checkout = client.create_checkout("popular").await?;
//! println!("Pay at {}", checkout.checkout_url);
//!
//! let status = client
//!     .wait_for_credit(&checkout.session_id, PollOptions::default())
//!     .await?;
//! println!("New balance: {} coins", status.balance);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, MarketplaceClient, PollOptions};
pub use error::ClientError;
pub use types::*;
