//! PostgreSQL storage implementation.
//!
//! Atomicity comes from one database transaction per compound operation:
//!
//! - `purchase` locks the account row (`SELECT ... FOR UPDATE`), then inserts
//!   the entitlement with `ON CONFLICT DO NOTHING`. The composite primary key
//!   is what rejects a concurrent second grant.
//! - `credit` updates the balance and inserts the ledger row; the partial
//!   unique index on credit references rejects a replayed event and rolls the
//!   balance update back with it.
//! - `debit` is a conditional `UPDATE ... WHERE balance_coins >= $amount`.

use promptmart_core::{
    Account, Entitlement, EntryId, Item, ItemId, LedgerEntry, LedgerReason, UserId,
};
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::Store;

const ACCOUNT_COLUMNS: &str = "user_id, balance_coins, lifetime_purchased_coins, \
     lifetime_spent_coins, created_at, updated_at";

const ITEM_COLUMNS: &str = "item_id, title, description, content, preview, price_coins, \
     image_url, category, tags, created_at, updated_at";

const ENTRY_COLUMNS: &str = "entry_id, user_id, delta_coins, reason, reference_id, \
     balance_after_coins, description, metadata, created_at";

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to PostgreSQL.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        balance_coins: row.try_get("balance_coins")?,
        lifetime_purchased_coins: row.try_get("lifetime_purchased_coins")?,
        lifetime_spent_coins: row.try_get("lifetime_spent_coins")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item> {
    Ok(Item {
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        content: row.try_get("content")?,
        preview: row.try_get("preview")?,
        price_coins: row.try_get("price_coins")?,
        image_url: row.try_get("image_url")?,
        category: row.try_get("category")?,
        tags: row.try_get("tags")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entitlement_from_row(row: &PgRow) -> Result<Entitlement> {
    Ok(Entitlement {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        price_paid_coins: row.try_get("price_paid_coins")?,
        granted_at: row.try_get("granted_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let entry_id: String = row.try_get("entry_id")?;
    let reason: String = row.try_get("reason")?;
    let Json(metadata): Json<serde_json::Value> = row.try_get("metadata")?;

    Ok(LedgerEntry {
        entry_id: entry_id
            .parse::<EntryId>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        delta_coins: row.try_get("delta_coins")?,
        reason: LedgerReason::parse(&reason)
            .ok_or_else(|| StoreError::Serialization(format!("unknown ledger reason: {reason}")))?,
        reference_id: row.try_get("reference_id")?,
        balance_after_coins: row.try_get("balance_after_coins")?,
        description: row.try_get("description")?,
        metadata,
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_entry(
    conn: &mut PgConnection,
    entry: &LedgerEntry,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO ledger_entries ({ENTRY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    ))
    .bind(entry.entry_id.to_string())
    .bind(entry.user_id.as_uuid())
    .bind(entry.delta_coins)
    .bind(entry.reason.as_str())
    .bind(&entry.reference_id)
    .bind(entry.balance_after_coins)
    .bind(&entry.description)
    .bind(Json(&entry.metadata))
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Conditionally debit inside an open transaction and append the entry.
async fn debit_in(conn: &mut PgConnection, entry: LedgerEntry) -> Result<LedgerEntry> {
    let amount = entry.amount_coins();

    let row = sqlx::query(
        "UPDATE accounts
         SET balance_coins = balance_coins - $1,
             lifetime_spent_coins = lifetime_spent_coins + $1,
             updated_at = now()
         WHERE user_id = $2 AND balance_coins >= $1
         RETURNING balance_coins",
    )
    .bind(amount)
    .bind(entry.user_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| overflow_or(e, &entry))?;

    let Some(row) = row else {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance_coins FROM accounts WHERE user_id = $1")
                .bind(entry.user_id.as_uuid())
                .fetch_optional(&mut *conn)
                .await?;
        return Err(match balance {
            None => StoreError::account_not_found(entry.user_id),
            Some(balance) => StoreError::InsufficientCredits {
                balance,
                required: amount,
            },
        });
    };

    let entry = entry.with_balance_after(row.try_get("balance_coins")?);
    insert_entry(conn, &entry).await?;
    Ok(entry)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Map `numeric_value_out_of_range` on an account update to `BalanceOverflow`.
fn overflow_or(err: sqlx::Error, entry: &LedgerEntry) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("22003") => {
            StoreError::BalanceOverflow {
                user_id: entry.user_id.to_string(),
                amount: entry.amount_coins(),
            }
        }
        _ => err.into(),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_account(&self, account: &Account) -> Result<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id) DO NOTHING"
        ))
        .bind(account.user_id.as_uuid())
        .bind(account.balance_coins)
        .bind(account.lifetime_purchased_coins)
        .bind(account.lifetime_spent_coins)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(account_from_row)
        .transpose()
    }

    async fn put_item(&self, item: &Item) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO items ({ITEM_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (item_id) DO UPDATE SET
                 title = EXCLUDED.title,
                 description = EXCLUDED.description,
                 content = EXCLUDED.content,
                 preview = EXCLUDED.preview,
                 price_coins = EXCLUDED.price_coins,
                 image_url = EXCLUDED.image_url,
                 category = EXCLUDED.category,
                 tags = EXCLUDED.tags,
                 updated_at = EXCLUDED.updated_at"
        ))
        .bind(item.item_id.as_uuid())
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.content)
        .bind(&item.preview)
        .bind(item.price_coins)
        .bind(&item.image_url)
        .bind(&item.category)
        .bind(item.tags.clone())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>> {
        sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE item_id = $1"))
            .bind(item_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(item_from_row)
            .transpose()
    }

    async fn list_items(&self) -> Result<Vec<Item>> {
        sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(item_from_row)
        .collect()
    }

    async fn get_entitlement(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<Entitlement>> {
        sqlx::query(
            "SELECT user_id, item_id, price_paid_coins, granted_at
             FROM entitlements WHERE user_id = $1 AND item_id = $2",
        )
        .bind(user_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(entitlement_from_row)
        .transpose()
    }

    async fn list_entitlements(&self, user_id: &UserId) -> Result<Vec<Entitlement>> {
        sqlx::query(
            "SELECT user_id, item_id, price_paid_coins, granted_at
             FROM entitlements WHERE user_id = $1 ORDER BY granted_at DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(entitlement_from_row)
        .collect()
    }

    async fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE user_id = $1
             ORDER BY created_at DESC, entry_id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(entry_from_row)
        .collect()
    }

    async fn get_credit_entry(&self, reference_id: &str) -> Result<Option<LedgerEntry>> {
        sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries
             WHERE reference_id = $1 AND reason = 'credit'"
        ))
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(entry_from_row)
        .transpose()
    }

    async fn debit(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;
        let entry = debit_in(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn credit(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE accounts
             SET balance_coins = balance_coins + $1,
                 lifetime_purchased_coins = lifetime_purchased_coins + $1,
                 updated_at = now()
             WHERE user_id = $2
             RETURNING balance_coins",
        )
        .bind(entry.amount_coins())
        .bind(entry.user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| overflow_or(e, &entry))?;

        let Some(balance) = balance else {
            return Err(StoreError::account_not_found(entry.user_id));
        };

        let entry = entry.with_balance_after(balance);
        if let Err(e) = insert_entry(&mut tx, &entry).await {
            return Err(if is_unique_violation(&e) {
                StoreError::DuplicateEvent {
                    event_id: entry.reference_id,
                }
            } else {
                e.into()
            });
        }

        tx.commit().await?;
        Ok(entry)
    }

    async fn purchase(
        &self,
        entitlement: &Entitlement,
        entry: LedgerEntry,
    ) -> Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> =
            sqlx::query_scalar("SELECT balance_coins FROM accounts WHERE user_id = $1 FOR UPDATE")
                .bind(entitlement.user_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::account_not_found(entitlement.user_id));
        }

        let granted = sqlx::query(
            "INSERT INTO entitlements (user_id, item_id, price_paid_coins, granted_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, item_id) DO NOTHING",
        )
        .bind(entitlement.user_id.as_uuid())
        .bind(entitlement.item_id.as_uuid())
        .bind(entitlement.price_paid_coins)
        .bind(entitlement.granted_at)
        .execute(&mut *tx)
        .await?;

        if granted.rows_affected() == 0 {
            return Err(StoreError::AlreadyOwned {
                user_id: entitlement.user_id.to_string(),
                item_id: entitlement.item_id.to_string(),
            });
        }

        let entry = debit_in(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(entry)
    }
}
