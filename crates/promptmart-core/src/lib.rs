//! Core types and utilities for promptmart.
//!
//! This crate provides the foundational types shared by the store, the
//! service and the client SDK:
//!
//! - **Identifiers**: `UserId`, `ItemId`, `EntryId`
//! - **Accounts**: `Account`
//! - **Catalog**: `Item`, `CoinPackage`
//! - **Ownership**: `Entitlement`
//! - **Ledger**: `LedgerEntry`, `LedgerReason`
//! - **Payments**: `PaymentEvent`
//!
//! # Coins
//!
//! Coins are whole units stored as `i64`. Users buy them in packages through
//! Stripe Checkout and spend them to unlock items. A balance never goes
//! negative.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod entitlement;
pub mod error;
pub mod ids;
pub mod item;
pub mod ledger;
pub mod packages;
pub mod payment;

pub use account::Account;
pub use entitlement::Entitlement;
pub use error::{MarketError, Result};
pub use ids::{EntryId, IdError, ItemId, UserId};
pub use item::{Item, NewItem, PREVIEW_MIN_WORDS};
pub use ledger::{LedgerEntry, LedgerReason};
pub use packages::{find_package, CoinPackage, COIN_PACKAGES};
pub use payment::PaymentEvent;
