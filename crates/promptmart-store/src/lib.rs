//! Transactional storage layer for promptmart.
//!
//! This crate owns the authoritative copy of balances, entitlements and the
//! ledger. Every balance mutation goes through one of three atomic
//! primitives on [`Store`]: `debit`, `credit` and `purchase`. Each one checks,
//! mutates and appends its ledger entry inside a single database transaction,
//! so concurrent callers (in one process or many) can never observe a stale
//! balance or a half-applied purchase.
//!
//! # Backends
//!
//! - [`PgStore`]: PostgreSQL through `sqlx`. Row locks, a composite primary key
//!   on entitlements and a partial unique index on credit references.
//! - `RocksStore` (feature `rocksdb-backend`): a RocksDB `TransactionDB` with
//!   pessimistic key locks. Column families:
//!   - `accounts`: keyed by `user_id`
//!   - `items`: keyed by `item_id`
//!   - `entitlements`: keyed by `user_id || item_id`
//!   - `ledger_entries`: keyed by `entry_id` (ULID)
//!   - `ledger_by_user`: index `user_id || entry_id`
//!   - `credit_refs`: credit `reference_id` to `entry_id`
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "rocksdb-backend")]
//! # async fn example() -> promptmart_store::Result<()> {
//! use promptmart_core::{Account, LedgerEntry, UserId};
//! use promptmart_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/promptmart-db")?;
//!
//! let user_id = UserId::generate();
//! store.create_account(&Account::new(user_id)).await?;
//!
//! let entry = LedgerEntry::credit(user_id, 50, "cs_test_123", "Popular Pack", serde_json::Value::Null);
//! let applied = store.credit(entry).await?;
//! assert_eq!(applied.balance_after_coins, 50);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod postgres;
pub mod schema;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;

pub use error::{Result, StoreError};
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use promptmart_core::{Account, Entitlement, Item, ItemId, LedgerEntry, UserId};

/// The storage trait defining all database operations.
///
/// Implementations must not cache balances or ownership in memory: every call
/// reads the authoritative state.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Accounts
    // =========================================================================

    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already has one.
    async fn create_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Insert or replace a catalog item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_item(&self, item: &Item) -> Result<()>;

    /// Get an item by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>>;

    /// List all items, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_items(&self) -> Result<Vec<Item>>;

    // =========================================================================
    // Entitlements and ledger (read side)
    // =========================================================================

    /// Get the entitlement for a (user, item) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_entitlement(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<Entitlement>>;

    /// List a user's entitlements, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_entitlements(&self, user_id: &UserId) -> Result<Vec<Entitlement>>;

    /// List a user's ledger entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// Find the credit entry recorded under `reference_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_credit_entry(&self, reference_id: &str) -> Result<Option<LedgerEntry>>;

    // =========================================================================
    // Atomic primitives
    // =========================================================================

    /// Debit `entry.amount_coins()` from `entry.user_id` and append `entry`.
    ///
    /// Returns the stored entry with `balance_after_coins` set.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance is too low; nothing
    ///   is written.
    /// - `StoreError::BalanceOverflow` if a coin counter would leave the
    ///   `i64` range.
    async fn debit(&self, entry: LedgerEntry) -> Result<LedgerEntry>;

    /// Credit `entry.amount_coins()` to `entry.user_id` and append `entry`.
    ///
    /// `entry.reference_id` is unique among credits; the uniqueness check runs
    /// inside the same transaction as the balance update.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::DuplicateEvent` if a credit with this reference exists.
    /// - `StoreError::BalanceOverflow` if the balance would leave the `i64`
    ///   range; nothing is written.
    async fn credit(&self, entry: LedgerEntry) -> Result<LedgerEntry>;

    /// Grant `entitlement` and debit its price in one transaction.
    ///
    /// Ownership is checked before funds. Either the entitlement, the debit
    /// and the ledger entry all commit, or none of them do.
    ///
    /// # Errors
    ///
    /// - `StoreError::AlreadyOwned` if the pair already has an entitlement.
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance is too low.
    async fn purchase(&self, entitlement: &Entitlement, entry: LedgerEntry)
        -> Result<LedgerEntry>;
}
