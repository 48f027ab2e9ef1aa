//! Database schema definitions.
//!
//! Column families for the `RocksDB` backend. The PostgreSQL schema lives in
//! `migrations/`.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Catalog items, keyed by `item_id`.
    pub const ITEMS: &str = "items";

    /// Entitlements, keyed by `user_id || item_id`.
    pub const ENTITLEMENTS: &str = "entitlements";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER_ENTRIES: &str = "ledger_entries";

    /// Index: ledger entries by user, keyed by `user_id || entry_id`.
    /// Value is empty (index only).
    pub const LEDGER_BY_USER: &str = "ledger_by_user";

    /// Credit references for idempotency, keyed by `reference_id`.
    /// Value is the `entry_id` of the credit.
    pub const CREDIT_REFS: &str = "credit_refs";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::ITEMS,
        cf::ENTITLEMENTS,
        cf::LEDGER_ENTRIES,
        cf::LEDGER_BY_USER,
        cf::CREDIT_REFS,
    ]
}
