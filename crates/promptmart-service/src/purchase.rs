//! Atomic entitlement purchase.

use std::sync::Arc;

use promptmart_core::{Entitlement, EntryId, ItemId, LedgerEntry, UserId};
use promptmart_store::{Store, StoreError};

/// Why a purchase did not grant an entitlement.
#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    /// No item with this id.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// The buyer has no account.
    #[error("account not found: {0}")]
    AccountNotFound(UserId),

    /// The buyer already owns the item. Nothing was debited.
    #[error("item {item_id} already owned by {user_id}")]
    AlreadyOwned {
        /// The buyer.
        user_id: UserId,
        /// The item.
        item_id: ItemId,
    },

    /// The balance does not cover the price. Nothing was written.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Balance at the time of the attempt.
        balance: i64,
        /// Item price.
        required: i64,
    },

    /// Storage was momentarily unavailable. Nothing was written; retry.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PurchaseError {
    /// Whether the caller may retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn from_store(err: StoreError, user_id: UserId, item_id: ItemId) -> Self {
        match err {
            StoreError::AlreadyOwned { .. } => Self::AlreadyOwned { user_id, item_id },
            StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientFunds { balance, required }
            }
            StoreError::NotFound { .. } => Self::AccountNotFound(user_id),
            StoreError::Transient(msg) => Self::Transient(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// A granted purchase.
#[derive(Debug, Clone)]
pub struct Purchase {
    /// The new entitlement.
    pub entitlement: Entitlement,
    /// The debit's ledger entry.
    pub entry_id: EntryId,
    /// Balance after the debit.
    pub balance_after: i64,
}

/// Spends coins to unlock items, exactly once per (user, item).
#[derive(Clone)]
pub struct PurchaseEngine {
    store: Arc<dyn Store>,
}

impl PurchaseEngine {
    /// Create an engine over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Buy `item_id` for `user_id`.
    ///
    /// The ownership check, the debit, the entitlement and the ledger entry
    /// commit in one store transaction. Ownership is checked before funds.
    pub async fn purchase(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<Purchase, PurchaseError> {
        let item = self
            .store
            .get_item(&item_id)
            .await
            .map_err(|e| PurchaseError::from_store(e, user_id, item_id))?
            .ok_or(PurchaseError::ItemNotFound(item_id))?;

        let entitlement = Entitlement::grant(user_id, item_id, item.price_coins);
        let entry = LedgerEntry::purchase(user_id, item_id, item.price_coins, &item.title);

        let entry = match self.store.purchase(&entitlement, entry).await {
            Ok(entry) => entry,
            Err(err) => {
                let err = PurchaseError::from_store(err, user_id, item_id);
                match &err {
                    PurchaseError::Transient(_) | PurchaseError::Storage(_) => {
                        tracing::warn!(
                            user_id = %user_id,
                            item_id = %item_id,
                            error = %err,
                            "Purchase rolled back"
                        );
                    }
                    _ => {
                        tracing::debug!(
                            user_id = %user_id,
                            item_id = %item_id,
                            error = %err,
                            "Purchase refused"
                        );
                    }
                }
                return Err(err);
            }
        };

        tracing::info!(
            user_id = %user_id,
            item_id = %item_id,
            price = item.price_coins,
            balance = entry.balance_after_coins,
            "Item purchased"
        );

        Ok(Purchase {
            entitlement,
            entry_id: entry.entry_id,
            balance_after: entry.balance_after_coins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptmart_core::{Account, Item, NewItem};
    use promptmart_store::RocksStore;
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<RocksStore>,
        engine: PurchaseEngine,
        _dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = Arc::new(RocksStore::open(dir.path()).unwrap());
            let engine = PurchaseEngine::new(store.clone());
            Self {
                store,
                engine,
                _dir: dir,
            }
        }

        async fn user(&self, balance: i64) -> UserId {
            let user_id = UserId::generate();
            let mut account = Account::new(user_id);
            account.balance_coins = balance;
            self.store.create_account(&account).await.unwrap();
            user_id
        }

        async fn item(&self, price: i64) -> ItemId {
            let item = Item::create(NewItem {
                title: "SQL tutor".into(),
                content: "Act as a patient SQL tutor who explains joins with examples.".into(),
                category: "education".into(),
                price_coins: price,
                ..Default::default()
            })
            .unwrap();
            self.store.put_item(&item).await.unwrap();
            item.item_id
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

    #[tokio::test]
    async fn scenario_a_purchase_with_sufficient_balance() {
        let fx = Fixture::new();
        let user_id = fx.user(50).await;
        let item_id = fx.item(30).await;

        let purchase = fx.engine.purchase(user_id, item_id).await.unwrap();
        assert_eq!(purchase.balance_after, 20);
        assert_eq!(purchase.entitlement.price_paid_coins, 30);
        assert_eq!(fx.balance(user_id).await, 20);

        let history = fx.store.list_ledger_entries(&user_id, 10, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].delta_coins, -30);
        assert_eq!(history[0].reference_id, item_id.to_string());
    }

    #[tokio::test]
    async fn scenario_b_repeat_purchase_is_already_owned() {
        let fx = Fixture::new();
        let user_id = fx.user(50).await;
        let item_id = fx.item(30).await;

        fx.engine.purchase(user_id, item_id).await.unwrap();
        let err = fx.engine.purchase(user_id, item_id).await.unwrap_err();

        assert!(matches!(err, PurchaseError::AlreadyOwned { .. }));
        assert_eq!(fx.balance(user_id).await, 20);
    }

    #[tokio::test]
    async fn scenario_c_insufficient_funds() {
        let fx = Fixture::new();
        let user_id = fx.user(10).await;
        let item_id = fx.item(30).await;

        let err = fx.engine.purchase(user_id, item_id).await.unwrap_err();

        assert!(matches!(
            err,
            PurchaseError::InsufficientFunds {
                balance: 10,
                required: 30
            }
        ));
        assert_eq!(fx.balance(user_id).await, 10);
        assert!(fx
            .store
            .get_entitlement(&user_id, &item_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn owner_with_low_balance_sees_already_owned() {
        let fx = Fixture::new();
        let user_id = fx.user(30).await;
        let item_id = fx.item(30).await;

        fx.engine.purchase(user_id, item_id).await.unwrap();
        assert_eq!(fx.balance(user_id).await, 0);

        let err = fx.engine.purchase(user_id, item_id).await.unwrap_err();
        assert!(matches!(err, PurchaseError::AlreadyOwned { .. }));
    }

    #[tokio::test]
    async fn unknown_item_and_account() {
        let fx = Fixture::new();
        let user_id = fx.user(100).await;

        let missing = ItemId::generate();
        let err = fx.engine.purchase(user_id, missing).await.unwrap_err();
        assert!(matches!(err, PurchaseError::ItemNotFound(id) if id == missing));

        let item_id = fx.item(10).await;
        let stranger = UserId::generate();
        let err = fx.engine.purchase(stranger, item_id).await.unwrap_err();
        assert!(matches!(err, PurchaseError::AccountNotFound(id) if id == stranger));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_double_spend_under_concurrency() {
        let fx = Fixture::new();
        let balance = 100;
        let price = 30;
        let user_id = fx.user(balance).await;

        let mut items = Vec::new();
        for _ in 0..8 {
            items.push(fx.item(price).await);
        }

        let handles: Vec<_> = items
            .into_iter()
            .map(|item_id| {
                let engine = fx.engine.clone();
                tokio::spawn(async move { engine.purchase(user_id, item_id).await })
            })
            .collect();

        let mut granted = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => granted += 1,
                Err(PurchaseError::InsufficientFunds { .. }) => refused += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(granted, balance / price);
        assert_eq!(refused, 8 - balance / price);
        assert_eq!(fx.balance(user_id).await, balance % price);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_double_grant_under_concurrency() {
        let fx = Fixture::new();
        let user_id = fx.user(500).await;
        let item_id = fx.item(30).await;

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let engine = fx.engine.clone();
                tokio::spawn(async move { engine.purchase(user_id, item_id).await })
            })
            .collect();

        let mut granted = 0;
        let mut owned = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => granted += 1,
                Err(PurchaseError::AlreadyOwned { .. }) => owned += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(granted, 1);
        assert_eq!(owned, 5);
        assert_eq!(fx.balance(user_id).await, 470);
        assert_eq!(fx.store.list_entitlements(&user_id).await.unwrap().len(), 1);
    }

    /// Serves one catalog item and fails every write as a lock timeout would.
    struct UnavailableStore {
        item: Item,
    }

    fn lock_timeout() -> StoreError {
        StoreError::Transient("Operation timed out: Timeout waiting to lock key".into())
    }

    #[async_trait::async_trait]
    impl Store for UnavailableStore {
        async fn create_account(&self, _: &Account) -> promptmart_store::Result<()> {
            Err(lock_timeout())
        }
        async fn get_account(&self, _: &UserId) -> promptmart_store::Result<Option<Account>> {
            Ok(None)
        }
        async fn put_item(&self, _: &Item) -> promptmart_store::Result<()> {
            Err(lock_timeout())
        }
        async fn get_item(&self, item_id: &ItemId) -> promptmart_store::Result<Option<Item>> {
            Ok((*item_id == self.item.item_id).then(|| self.item.clone()))
        }
        async fn list_items(&self) -> promptmart_store::Result<Vec<Item>> {
            Ok(vec![self.item.clone()])
        }
        async fn get_entitlement(
            &self,
            _: &UserId,
            _: &ItemId,
        ) -> promptmart_store::Result<Option<Entitlement>> {
            Ok(None)
        }
        async fn list_entitlements(&self, _: &UserId) -> promptmart_store::Result<Vec<Entitlement>> {
            Ok(Vec::new())
        }
        async fn list_ledger_entries(
            &self,
            _: &UserId,
            _: usize,
            _: usize,
        ) -> promptmart_store::Result<Vec<LedgerEntry>> {
            Ok(Vec::new())
        }
        async fn get_credit_entry(&self, _: &str) -> promptmart_store::Result<Option<LedgerEntry>> {
            Ok(None)
        }
        async fn debit(&self, _: LedgerEntry) -> promptmart_store::Result<LedgerEntry> {
            Err(lock_timeout())
        }
        async fn credit(&self, _: LedgerEntry) -> promptmart_store::Result<LedgerEntry> {
            Err(lock_timeout())
        }
        async fn purchase(
            &self,
            _: &Entitlement,
            _: LedgerEntry,
        ) -> promptmart_store::Result<LedgerEntry> {
            Err(lock_timeout())
        }
    }

    #[tokio::test]
    async fn storage_timeout_is_reported_as_transient() {
        let item = Item::create(NewItem {
            title: "SQL tutor".into(),
            content: "Act as a patient SQL tutor who explains joins with examples.".into(),
            category: "education".into(),
            price_coins: 30,
            ..Default::default()
        })
        .unwrap();
        let item_id = item.item_id;
        let engine = PurchaseEngine::new(Arc::new(UnavailableStore { item }));

        let err = engine
            .purchase(UserId::generate(), item_id)
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::Transient(_)));
        assert!(err.is_transient());
    }
}
