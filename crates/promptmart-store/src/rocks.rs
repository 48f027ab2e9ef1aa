//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait on
//! top of a pessimistic `TransactionDB`. Every compound operation locks the
//! keys it reads with `get_for_update_cf` before deciding, so two concurrent
//! purchases against the same account serialize on the account key.
//!
//! Lock order is always: uniqueness key (entitlement or credit reference)
//! first, account key last. Debits only take the account key.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode, MultiThreaded,
    Options, Transaction, TransactionDB, TransactionDBOptions,
};

use promptmart_core::{Account, Entitlement, EntryId, Item, ItemId, LedgerEntry, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// Default time a transaction waits for a key lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type Db = TransactionDB<MultiThreaded>;
type Txn<'a> = Transaction<'a, Db>;

/// RocksDB-backed storage implementation.
#[derive(Clone)]
pub struct RocksStore {
    inner: Arc<Inner>,
}

struct Inner {
    db: Db,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_lock_timeout(path, DEFAULT_LOCK_TIMEOUT)
    }

    /// Open with a custom key-lock timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open_with_lock_timeout<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(i64::try_from(lock_timeout.as_millis()).unwrap_or(i64::MAX));

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, &txn_opts, path.as_ref(), cf_descriptors)
            .map_err(db_err)?;

        tracing::debug!(path = %path.as_ref().display(), "Opened RocksDB transaction store");

        Ok(Self {
            inner: Arc::new(Inner { db }),
        })
    }

    /// Run a blocking closure against the database off the async runtime.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| StoreError::Database(format!("storage task failed: {e}")))?
    }
}

/// Map a `RocksDB` error, treating lock contention as transient.
fn db_err(e: rocksdb::Error) -> StoreError {
    match e.kind() {
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
            StoreError::Transient(e.to_string())
        }
        _ => StoreError::Database(e.to_string()),
    }
}

fn overflow(entry: &LedgerEntry) -> StoreError {
    StoreError::BalanceOverflow {
        user_id: entry.user_id.to_string(),
        amount: entry.amount_coins(),
    }
}

/// Serialize a value using CBOR.
fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a value from CBOR.
fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl Inner {
    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_err)?
            .map(|data| deserialize(&data))
            .transpose()
    }

    /// Collect the keys of a column family that start with `prefix`, in order.
    fn prefix_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut keys = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(db_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>> {
        self.get(cf::LEDGER_ENTRIES, &keys::entry_key(entry_id))
    }

    // =========================================================================
    // Transaction helpers
    // =========================================================================

    /// Read and lock an account inside `txn`.
    fn lock_account(&self, txn: &Txn<'_>, user_id: &UserId) -> Result<Account> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let data = txn
            .get_for_update_cf(&cf, keys::account_key(user_id), true)
            .map_err(db_err)?
            .ok_or_else(|| StoreError::account_not_found(user_id))?;
        deserialize(&data)
    }

    fn write_account(&self, txn: &Txn<'_>, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        txn.put_cf(&cf, keys::account_key(&account.user_id), serialize(account)?)
            .map_err(db_err)
    }

    fn write_entry(&self, txn: &Txn<'_>, entry: &LedgerEntry) -> Result<()> {
        let cf_entries = self.cf(cf::LEDGER_ENTRIES)?;
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;

        txn.put_cf(&cf_entries, keys::entry_key(&entry.entry_id), serialize(entry)?)
            .map_err(db_err)?;
        txn.put_cf(
            &cf_by_user,
            keys::user_entry_key(&entry.user_id, &entry.entry_id),
            [],
        )
        .map_err(db_err)
    }

    /// Lock the account, check funds, apply the debit and append the entry.
    fn debit_in(&self, txn: &Txn<'_>, entry: LedgerEntry) -> Result<LedgerEntry> {
        let amount = entry.amount_coins();
        let mut account = self.lock_account(txn, &entry.user_id)?;

        if !account.can_afford(amount) {
            return Err(StoreError::InsufficientCredits {
                balance: account.balance_coins,
                required: amount,
            });
        }

        account
            .apply_debit(amount)
            .map_err(|_| overflow(&entry))?;
        let entry = entry.with_balance_after(account.balance_coins);

        self.write_account(txn, &account)?;
        self.write_entry(txn, &entry)?;
        Ok(entry)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn create_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.user_id);

        let txn = self.db.transaction();
        if txn.get_for_update_cf(&cf, &key, true).map_err(db_err)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.user_id.to_string(),
            });
        }
        txn.put_cf(&cf, &key, serialize(account)?).map_err(db_err)?;
        txn.commit().map_err(db_err)
    }

    fn put_item(&self, item: &Item) -> Result<()> {
        let cf = self.cf(cf::ITEMS)?;
        self.db
            .put_cf(&cf, keys::item_key(&item.item_id), serialize(item)?)
            .map_err(db_err)
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        let cf = self.cf(cf::ITEMS)?;
        let mut items = Vec::new();
        for entry in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = entry.map_err(db_err)?;
            items.push(deserialize::<Item>(&value)?);
        }
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    fn list_entitlements(&self, user_id: &UserId) -> Result<Vec<Entitlement>> {
        let cf = self.cf(cf::ENTITLEMENTS)?;
        let prefix = keys::user_prefix(user_id);

        let mut entitlements = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for entry in iter {
            let (key, value) = entry.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            entitlements.push(deserialize::<Entitlement>(&value)?);
        }
        entitlements.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(entitlements)
    }

    fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let mut index_keys = self.prefix_keys(cf::LEDGER_BY_USER, &keys::user_prefix(user_id))?;

        // ULIDs are time-ordered; reverse for newest first
        index_keys.reverse();

        let mut entries = Vec::new();
        for key in index_keys.iter().skip(offset).take(limit) {
            let Some(entry_id) = keys::entry_id_from_user_key(key) else {
                tracing::warn!(key_len = key.len(), "Skipping malformed ledger index key");
                continue;
            };
            if let Some(entry) = self.get_entry(&entry_id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn get_credit_entry(&self, reference_id: &str) -> Result<Option<LedgerEntry>> {
        let cf = self.cf(cf::CREDIT_REFS)?;
        let Some(raw) = self
            .db
            .get_cf(&cf, keys::credit_ref_key(reference_id))
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let bytes: [u8; 16] = raw
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization("malformed credit reference".into()))?;
        self.get_entry(&EntryId::from_bytes(bytes))
    }

    fn debit(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        let txn = self.db.transaction();
        let entry = self.debit_in(&txn, entry)?;
        txn.commit().map_err(db_err)?;
        Ok(entry)
    }

    fn credit(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        let cf_refs = self.cf(cf::CREDIT_REFS)?;
        let ref_key = keys::credit_ref_key(&entry.reference_id);

        let txn = self.db.transaction();

        if txn
            .get_for_update_cf(&cf_refs, &ref_key, true)
            .map_err(db_err)?
            .is_some()
        {
            return Err(StoreError::DuplicateEvent {
                event_id: entry.reference_id,
            });
        }

        let mut account = self.lock_account(&txn, &entry.user_id)?;
        account
            .apply_credit(entry.amount_coins())
            .map_err(|_| overflow(&entry))?;
        let entry = entry.with_balance_after(account.balance_coins);

        self.write_account(&txn, &account)?;
        self.write_entry(&txn, &entry)?;
        txn.put_cf(&cf_refs, &ref_key, entry.entry_id.to_bytes())
            .map_err(db_err)?;

        txn.commit().map_err(db_err)?;
        Ok(entry)
    }

    fn purchase(&self, entitlement: &Entitlement, entry: LedgerEntry) -> Result<LedgerEntry> {
        let cf_ent = self.cf(cf::ENTITLEMENTS)?;
        let ent_key = keys::entitlement_key(&entitlement.user_id, &entitlement.item_id);

        let txn = self.db.transaction();

        if txn
            .get_for_update_cf(&cf_ent, &ent_key, true)
            .map_err(db_err)?
            .is_some()
        {
            return Err(StoreError::AlreadyOwned {
                user_id: entitlement.user_id.to_string(),
                item_id: entitlement.item_id.to_string(),
            });
        }

        let entry = self.debit_in(&txn, entry)?;
        txn.put_cf(&cf_ent, &ent_key, serialize(entitlement)?)
            .map_err(db_err)?;

        txn.commit().map_err(db_err)?;
        Ok(entry)
    }
}

#[async_trait]
impl Store for RocksStore {
    async fn create_account(&self, account: &Account) -> Result<()> {
        let account = account.clone();
        self.run(move |inner| inner.create_account(&account)).await
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let key = keys::account_key(user_id);
        self.run(move |inner| inner.get(cf::ACCOUNTS, &key)).await
    }

    async fn put_item(&self, item: &Item) -> Result<()> {
        let item = item.clone();
        self.run(move |inner| inner.put_item(&item)).await
    }

    async fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>> {
        let key = keys::item_key(item_id);
        self.run(move |inner| inner.get(cf::ITEMS, &key)).await
    }

    async fn list_items(&self) -> Result<Vec<Item>> {
        self.run(Inner::list_items).await
    }

    async fn get_entitlement(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<Entitlement>> {
        let key = keys::entitlement_key(user_id, item_id);
        self.run(move |inner| inner.get(cf::ENTITLEMENTS, &key))
            .await
    }

    async fn list_entitlements(&self, user_id: &UserId) -> Result<Vec<Entitlement>> {
        let user_id = *user_id;
        self.run(move |inner| inner.list_entitlements(&user_id))
            .await
    }

    async fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let user_id = *user_id;
        self.run(move |inner| inner.list_ledger_entries(&user_id, limit, offset))
            .await
    }

    async fn get_credit_entry(&self, reference_id: &str) -> Result<Option<LedgerEntry>> {
        let reference_id = reference_id.to_string();
        self.run(move |inner| inner.get_credit_entry(&reference_id))
            .await
    }

    async fn debit(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        self.run(move |inner| inner.debit(entry)).await
    }

    async fn credit(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        self.run(move |inner| inner.credit(entry)).await
    }

    async fn purchase(
        &self,
        entitlement: &Entitlement,
        entry: LedgerEntry,
    ) -> Result<LedgerEntry> {
        let entitlement = entitlement.clone();
        self.run(move |inner| inner.purchase(&entitlement, entry))
            .await
    }
}
