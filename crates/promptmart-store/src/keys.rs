//! Key encoding utilities for `RocksDB`.

use promptmart_core::{EntryId, ItemId, UserId};

/// Account key: the 16 bytes of the user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Item key: the 16 bytes of the item ID.
#[must_use]
pub fn item_key(item_id: &ItemId) -> Vec<u8> {
    item_id.as_bytes().to_vec()
}

/// Entitlement key.
///
/// Format: `user_id (16 bytes) || item_id (16 bytes)`. One key per pair, which
/// is what makes the pair unique.
#[must_use]
pub fn entitlement_key(user_id: &UserId, item_id: &ItemId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(item_id.as_bytes());
    key
}

/// Ledger entry key: the 16 bytes of the ULID.
#[must_use]
pub fn entry_key(entry_id: &EntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// User-ledger index key.
///
/// Format: `user_id (16 bytes) || entry_id (16 bytes)`. ULIDs are time-ordered,
/// so a user's entries sort chronologically.
#[must_use]
pub fn user_entry_key(user_id: &UserId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Prefix covering every key owned by a user in the composite indexes.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the entry ID from a user-ledger index key.
///
/// Returns `None` if the key is not 32 bytes long.
#[must_use]
pub fn entry_id_from_user_key(key: &[u8]) -> Option<EntryId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(EntryId::from_bytes(bytes))
}

/// Credit reference key.
#[must_use]
pub fn credit_ref_key(reference_id: &str) -> Vec<u8> {
    reference_id.as_bytes().to_vec()
}
