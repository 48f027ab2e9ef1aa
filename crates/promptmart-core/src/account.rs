//! Account types for promptmart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::UserId;

/// A coin account for a user.
///
/// Balances are only changed through the ledger primitives of the store, which
/// append a [`crate::LedgerEntry`] in the same atomic unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The owning user.
    pub user_id: UserId,

    /// Current coin balance. Never negative.
    pub balance_coins: i64,

    /// Coins credited over the account's lifetime.
    pub lifetime_purchased_coins: i64,

    /// Coins spent over the account's lifetime.
    pub lifetime_spent_coins: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance_coins: 0,
            lifetime_purchased_coins: 0,
            lifetime_spent_coins: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can pay `amount` coins.
    #[must_use]
    pub fn can_afford(&self, amount: i64) -> bool {
        self.balance_coins >= amount
    }

    /// Apply a debit. Callers must check [`Account::can_afford`] first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::BalanceOverflow`] if a counter would leave the
    /// `i64` range. The account is left untouched.
    pub fn apply_debit(&mut self, amount: i64) -> Result<()> {
        let balance = self.balance_coins.checked_sub(amount);
        let spent = self.lifetime_spent_coins.checked_add(amount);
        let (Some(balance), Some(spent)) = (balance, spent) else {
            return Err(MarketError::BalanceOverflow(amount));
        };

        self.balance_coins = balance;
        self.lifetime_spent_coins = spent;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply a credit.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::BalanceOverflow`] if the balance or the lifetime
    /// total would leave the `i64` range. The account is left untouched.
    pub fn apply_credit(&mut self, amount: i64) -> Result<()> {
        let balance = self.balance_coins.checked_add(amount);
        let purchased = self.lifetime_purchased_coins.checked_add(amount);
        let (Some(balance), Some(purchased)) = (balance, purchased) else {
            return Err(MarketError::BalanceOverflow(amount));
        };

        self.balance_coins = balance;
        self.lifetime_purchased_coins = purchased;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_has_zero_balance() {
        let account = Account::new(UserId::generate());
        assert_eq!(account.balance_coins, 0);
        assert_eq!(account.lifetime_purchased_coins, 0);
        assert_eq!(account.lifetime_spent_coins, 0);
    }

    #[test]
    fn affordability_is_inclusive() {
        let mut account = Account::new(UserId::generate());
        account.balance_coins = 30;

        assert!(account.can_afford(29));
        assert!(account.can_afford(30));
        assert!(!account.can_afford(31));
    }

    #[test]
    fn debit_and_credit_track_lifetime_totals() {
        let mut account = Account::new(UserId::generate());
        account.apply_credit(50).unwrap();
        account.apply_debit(30).unwrap();

        assert_eq!(account.balance_coins, 20);
        assert_eq!(account.lifetime_purchased_coins, 50);
        assert_eq!(account.lifetime_spent_coins, 30);
    }

    #[test]
    fn credit_past_i64_max_leaves_account_untouched() {
        let mut account = Account::new(UserId::generate());
        account.balance_coins = i64::MAX - 10;
        account.lifetime_purchased_coins = i64::MAX - 10;

        let err = account.apply_credit(100).unwrap_err();
        assert!(matches!(err, MarketError::BalanceOverflow(100)));
        assert_eq!(account.balance_coins, i64::MAX - 10);
        assert_eq!(account.lifetime_purchased_coins, i64::MAX - 10);
    }

    #[test]
    fn lifetime_spent_overflow_is_refused() {
        let mut account = Account::new(UserId::generate());
        account.balance_coins = 50;
        account.lifetime_spent_coins = i64::MAX;

        assert!(matches!(
            account.apply_debit(1),
            Err(MarketError::BalanceOverflow(1))
        ));
        assert_eq!(account.balance_coins, 50);
    }
}
