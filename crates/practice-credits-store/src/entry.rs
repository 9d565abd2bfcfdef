//! Ledger entries: the unit of work committed atomically by a [`Store`].
//!
//! An entry bundles a transaction with the counter change it implies. A store
//! applies the balance delta, appends the transaction, indexes its reference
//! id and updates the usage counters in one write, or does none of it.
//!
//! [`Store`]: crate::Store

use chrono::Utc;
use practice_credits_core::{Account, CreditTransaction, PackageId, UsageType};

use crate::error::{Result, StoreError};

/// Usage counter change carried by a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterChange {
    /// Counters untouched.
    Keep,
    /// Add metered units to one counter.
    Advance {
        /// Counter to advance.
        usage_type: UsageType,
        /// Units consumed.
        units: u64,
    },
    /// Make `package_id` the current package and start a new period.
    Activate {
        /// The purchased package.
        package_id: PackageId,
    },
}

/// One atomic ledger mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// The transaction to append. Its `balance_after` must follow from the
    /// account's balance at commit time.
    pub transaction: CreditTransaction,
    /// Counter change applied with it.
    pub counter: CounterChange,
}

impl LedgerEntry {
    /// An entry that leaves the usage counters alone.
    #[must_use]
    pub const fn new(transaction: CreditTransaction) -> Self {
        Self {
            transaction,
            counter: CounterChange::Keep,
        }
    }

    /// Attach a counter change.
    #[must_use]
    pub fn with_counter(mut self, counter: CounterChange) -> Self {
        self.counter = counter;
        self
    }

    /// Balance the entry was computed against.
    #[must_use]
    pub const fn expected_balance(&self) -> i64 {
        self.transaction
            .balance_after
            .saturating_sub(self.transaction.amount)
    }

    /// Apply the entry to an in-memory account record.
    ///
    /// Backends call this on a copy and persist the result together with the
    /// transaction; on error the copy is discarded.
    ///
    /// # Errors
    ///
    /// - `StoreError::StaleBalance` if the account balance is not the one the
    ///   entry was computed from.
    /// - `StoreError::InsufficientCredits` if the balance would go negative.
    pub fn apply_to(&self, account: &mut Account) -> Result<()> {
        let tx = &self.transaction;
        if account.account_id != tx.account_id {
            return Err(StoreError::Database(format!(
                "entry for {} applied to account {}",
                tx.account_id, account.account_id
            )));
        }

        let expected = self.expected_balance();
        if account.balance != expected {
            return Err(StoreError::StaleBalance {
                expected,
                actual: account.balance,
            });
        }

        let new_balance = account
            .balance
            .checked_add(tx.amount)
            .filter(|balance| *balance >= 0)
            .ok_or(StoreError::InsufficientCredits {
                balance: account.balance,
                required: tx.amount.saturating_neg(),
            })?;

        account.balance = new_balance;
        if tx.amount >= 0 {
            account.lifetime_purchased = account.lifetime_purchased.saturating_add(tx.amount);
        } else {
            account.lifetime_used = account.lifetime_used.saturating_sub(tx.amount);
        }

        match self.counter {
            CounterChange::Keep => {}
            CounterChange::Advance { usage_type, units } => account.usage.advance(usage_type, units),
            CounterChange::Activate { package_id } => {
                account.current_package = Some(package_id);
                account.usage.reset();
            }
        }

        account.updated_at = Utc::now();
        Ok(())
    }
}
