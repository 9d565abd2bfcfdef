//! The balance ledger.
//!
//! Every balance mutation for an account runs inside that account's critical
//! section: read the account, check the balance, build the transaction and
//! commit it through [`Store::commit`]. Different accounts never share a lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use practice_credits_core::{
    has_sufficient, is_low_balance, Account, AccountId, BillingError, CreditTransaction, Package,
    ReferenceId, Result, TransactionType, UsageType,
};
use practice_credits_store::{
    AccountStore, CounterChange, LedgerEntry, PackageStore, Store, TransactionQuery,
    TransactionStore,
};

/// Per-account mutexes, created on first use. Only accounts that exist get
/// an entry, and accounts are never deleted, so the map stays bounded.
#[derive(Default)]
struct AccountLocks {
    locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    fn for_account(&self, account_id: &AccountId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(*account_id).or_default())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A usage debit to be priced against the account inside its critical
/// section.
pub(crate) struct UsageCharge {
    pub account_id: AccountId,
    pub usage_type: UsageType,
    pub units: u64,
    pub reference_id: Option<ReferenceId>,
    pub package: Option<Package>,
}

/// Owns balance mutation for all accounts.
pub struct Ledger {
    store: Arc<dyn Store>,
    locks: AccountLocks,
}

impl Ledger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: AccountLocks::default(),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create an account with a zero balance.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the account cannot be written.
    pub fn open_account(&self, name: impl Into<String>) -> Result<Account> {
        let account = Account::new(AccountId::generate(), name);
        self.store.create_account(&account)?;
        tracing::info!(account_id = %account.account_id, name = %account.name, "Account opened");
        Ok(account)
    }

    /// Load an account.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::AccountNotFound` if it doesn't exist.
    pub fn account(&self, account_id: &AccountId) -> Result<Account> {
        self.store
            .get_account(account_id)?
            .ok_or_else(|| BillingError::AccountNotFound {
                account_id: account_id.to_string(),
            })
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Deduct `amount` credits from an account.
    ///
    /// Supplying a `reference_id` that was already used for the same account
    /// and usage type returns the original transaction and deducts nothing.
    ///
    /// # Errors
    ///
    /// - `BillingError::InsufficientCredits` if the balance is below `amount`.
    /// - `BillingError::ReferenceConflict` if the reference belongs to
    ///   another account or transaction type.
    /// - `BillingError::AccountNotFound` if the account doesn't exist.
    pub fn deduct(
        &self,
        account_id: &AccountId,
        amount: u64,
        usage_type: UsageType,
        reference_id: Option<ReferenceId>,
    ) -> Result<CreditTransaction> {
        let debit = signed(amount)?;
        self.locked(account_id, usage_type.into(), reference_id, |account, reference_id| {
            ensure_sufficient(account, amount)?;
            let tx = CreditTransaction::usage(
                account.account_id,
                usage_type,
                debit,
                account.balance - debit,
                None,
                reference_id,
                serde_json::Value::Null,
            );
            Ok(LedgerEntry::new(tx))
        })
    }

    /// Add `amount` credits to an account as a purchase.
    ///
    /// When `package` is given it becomes the account's current package and
    /// the usage counters restart, in the same commit.
    ///
    /// # Errors
    ///
    /// - `BillingError::InvalidAmount` if `amount` is zero.
    /// - `BillingError::ReferenceConflict` if the reference belongs to
    ///   another account or transaction type.
    /// - `BillingError::AccountNotFound` if the account doesn't exist.
    pub fn credit(
        &self,
        account_id: &AccountId,
        amount: u64,
        package: Option<&Package>,
        metadata: serde_json::Value,
        reference_id: Option<ReferenceId>,
    ) -> Result<CreditTransaction> {
        if amount == 0 {
            return Err(BillingError::InvalidAmount(
                "credit amount must be positive".into(),
            ));
        }
        let amount = signed(amount)?;
        let package_id = package.map(|p| p.id);

        self.locked(account_id, TransactionType::Purchase, reference_id, |account, reference_id| {
            let balance_after = account.balance.checked_add(amount).ok_or_else(|| {
                BillingError::InvalidAmount(format!("balance overflow adding {amount}"))
            })?;
            let tx = CreditTransaction::purchase(
                account.account_id,
                amount,
                balance_after,
                package_id,
                reference_id,
                metadata,
            );
            let entry = LedgerEntry::new(tx);
            Ok(match package_id {
                Some(package_id) => entry.with_counter(CounterChange::Activate { package_id }),
                None => entry,
            })
        })
    }

    /// Price and deduct metered usage, advancing the usage counter in the
    /// same commit. `price` sees the account as read inside the critical
    /// section.
    pub(crate) fn charge_usage<F>(&self, charge: UsageCharge, price: F) -> Result<CreditTransaction>
    where
        F: FnOnce(&Account) -> Result<u64>,
    {
        let UsageCharge {
            account_id,
            usage_type,
            units,
            reference_id,
            package,
        } = charge;

        self.locked(&account_id, usage_type.into(), reference_id, |account, reference_id| {
            let quoted = price(account)?;
            ensure_sufficient(account, quoted)?;
            let cost = signed(quoted)?;

            let mut tx = CreditTransaction::usage(
                account.account_id,
                usage_type,
                cost,
                account.balance - cost,
                Some(units),
                reference_id,
                serde_json::json!({ "units": units }),
            );
            tx.package_id = package.as_ref().map(|p| p.id);
            Ok(LedgerEntry::new(tx).with_counter(CounterChange::Advance { usage_type, units }))
        })
    }

    /// Run `build` inside the account's critical section and commit the entry
    /// it returns.
    fn locked<F>(
        &self,
        account_id: &AccountId,
        transaction_type: TransactionType,
        reference_id: Option<ReferenceId>,
        build: F,
    ) -> Result<CreditTransaction>
    where
        F: FnOnce(&Account, ReferenceId) -> Result<LedgerEntry>,
    {
        if self.store.get_account(account_id)?.is_none() {
            return Err(BillingError::AccountNotFound {
                account_id: account_id.to_string(),
            });
        }
        let lock = self.locks.for_account(account_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(reference_id) = reference_id {
            if let Some(original) = self.replay(account_id, transaction_type, &reference_id)? {
                return Ok(original);
            }
        }

        let account = self.account(account_id)?;
        let entry = match build(&account, reference_id.unwrap_or_else(ReferenceId::generate)) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(
                    account_id = %account_id,
                    transaction_type = %transaction_type,
                    error = %err,
                    "Ledger mutation rejected"
                );
                return Err(err);
            }
        };

        let updated = self.store.commit(&entry)?;
        let tx = entry.transaction;
        tracing::info!(
            account_id = %account_id,
            transaction_id = %tx.id,
            transaction_type = %tx.transaction_type,
            amount = tx.amount,
            balance = updated.balance,
            "Ledger mutation committed"
        );
        Ok(tx)
    }

    /// The transaction already recorded under `reference_id`, if it matches
    /// this request.
    pub(crate) fn replay(
        &self,
        account_id: &AccountId,
        transaction_type: TransactionType,
        reference_id: &ReferenceId,
    ) -> Result<Option<CreditTransaction>> {
        let Some(original) = self.store.find_by_reference(reference_id)? else {
            return Ok(None);
        };

        if original.account_id != *account_id || original.transaction_type != transaction_type {
            tracing::warn!(
                reference_id = %reference_id,
                account_id = %account_id,
                "Reference id reused for a different request"
            );
            return Err(BillingError::ReferenceConflict {
                reference_id: reference_id.to_string(),
            });
        }

        tracing::debug!(
            reference_id = %reference_id,
            transaction_id = %original.id,
            "Replaying recorded transaction"
        );
        Ok(Some(original))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The most recent purchase transaction of an account.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log cannot be read.
    pub fn last_purchase(&self, account_id: &AccountId) -> Result<Option<CreditTransaction>> {
        let query = TransactionQuery::newest_first()
            .of_type(TransactionType::Purchase)
            .page(0, 1);
        Ok(self
            .store
            .query_transactions(account_id, &query)?
            .into_iter()
            .next())
    }

    /// When the account last purchased credits.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log cannot be read.
    pub fn last_purchase_timestamp(&self, account_id: &AccountId) -> Result<Option<DateTime<Utc>>> {
        Ok(self.last_purchase(account_id)?.map(|tx| tx.created_at))
    }

    /// Whether the balance is below 20% of the most recently purchased
    /// package's credit amount. Accounts that never purchased are not low.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::AccountNotFound` if the account doesn't exist.
    pub fn low_balance_check(&self, account_id: &AccountId) -> Result<bool> {
        let balance = self.account(account_id)?.balance;
        let Some(purchase) = self.last_purchase(account_id)? else {
            return Ok(false);
        };

        let package = match purchase.package_id {
            Some(package_id) => self.store.get_package(&package_id)?,
            None => None,
        };
        let purchased = package.map_or(purchase.amount, |p| p.credit_amount);

        Ok(is_low_balance(balance, purchased))
    }

    /// Query an account's transactions.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::AccountNotFound` if the account doesn't exist.
    pub fn history(
        &self,
        account_id: &AccountId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>> {
        self.account(account_id)?;
        Ok(self.store.query_transactions(account_id, query)?)
    }

    /// The transaction recorded under an idempotency reference.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log cannot be read.
    pub fn find_by_reference(&self, reference_id: &ReferenceId) -> Result<Option<CreditTransaction>> {
        Ok(self.store.find_by_reference(reference_id)?)
    }
}

fn signed(amount: u64) -> Result<i64> {
    i64::try_from(amount)
        .map_err(|_| BillingError::InvalidAmount(format!("amount out of range: {amount}")))
}

fn ensure_sufficient(account: &Account, required: u64) -> Result<()> {
    if has_sufficient(account.balance, required) {
        Ok(())
    } else {
        Err(BillingError::InsufficientCredits {
            required,
            available: account.balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_credits_store::MemoryStore;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(MemoryStore::new()))
    }

    fn funded(ledger: &Ledger, credits: u64) -> AccountId {
        let account = ledger.open_account("Test Practice").unwrap();
        ledger
            .credit(&account.account_id, credits, None, serde_json::Value::Null, None)
            .unwrap();
        account.account_id
    }

    #[test]
    fn deduct_within_balance() {
        let ledger = ledger();
        let account_id = funded(&ledger, 100);

        let tx = ledger.deduct(&account_id, 40, UsageType::Sms, None).unwrap();
        assert_eq!(tx.amount, -40);
        assert_eq!(tx.balance_after, 60);
        assert_eq!(tx.transaction_type, TransactionType::SmsUsage);
        assert_eq!(ledger.account(&account_id).unwrap().balance, 60);
    }

    #[test]
    fn deduct_exact_balance_reaches_zero() {
        let ledger = ledger();
        let account_id = funded(&ledger, 100);

        ledger.deduct(&account_id, 100, UsageType::Voice, None).unwrap();
        assert_eq!(ledger.account(&account_id).unwrap().balance, 0);
    }

    #[test]
    fn deduct_beyond_balance_fails_cleanly() {
        let ledger = ledger();
        let account_id = funded(&ledger, 100);

        let err = ledger.deduct(&account_id, 101, UsageType::Sms, None).unwrap_err();
        assert!(matches!(
            err,
            BillingError::InsufficientCredits {
                required: 101,
                available: 100
            }
        ));
        let history = ledger.history(&account_id, &TransactionQuery::default()).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn deduct_zero_is_recorded() {
        let ledger = ledger();
        let account_id = funded(&ledger, 10);

        let tx = ledger.deduct(&account_id, 0, UsageType::Sms, None).unwrap();
        assert_eq!(tx.amount, 0);
        assert_eq!(tx.balance_after, 10);
    }

    #[test]
    fn credit_rejects_zero() {
        let ledger = ledger();
        let account = ledger.open_account("Test Practice").unwrap();
        let err = ledger
            .credit(&account.account_id, 0, None, serde_json::Value::Null, None)
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidAmount(_)));
    }

    #[test]
    fn unknown_account() {
        let ledger = ledger();
        let err = ledger
            .deduct(&AccountId::generate(), 1, UsageType::Sms, None)
            .unwrap_err();
        assert!(matches!(err, BillingError::AccountNotFound { .. }));
    }

    #[test]
    fn unknown_accounts_get_no_lock_entry() {
        let ledger = ledger();
        for _ in 0..100 {
            let err = ledger
                .deduct(&AccountId::generate(), 1, UsageType::Sms, None)
                .unwrap_err();
            assert!(matches!(err, BillingError::AccountNotFound { .. }));
        }
        assert_eq!(ledger.locks.len(), 0);

        let account_id = funded(&ledger, 10);
        ledger.deduct(&account_id, 1, UsageType::Sms, None).unwrap();
        assert_eq!(ledger.locks.len(), 1);
    }

    #[test]
    fn replayed_reference_returns_original() {
        let ledger = ledger();
        let account_id = funded(&ledger, 100);
        let reference = ReferenceId::generate();

        let first = ledger
            .deduct(&account_id, 30, UsageType::Sms, Some(reference))
            .unwrap();
        let second = ledger
            .deduct(&account_id, 30, UsageType::Sms, Some(reference))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.account(&account_id).unwrap().balance, 70);
    }

    #[test]
    fn reference_reused_elsewhere_conflicts() {
        let ledger = ledger();
        let account_id = funded(&ledger, 100);
        let other_id = funded(&ledger, 100);
        let reference = ReferenceId::generate();
        ledger
            .deduct(&account_id, 10, UsageType::Sms, Some(reference))
            .unwrap();

        let err = ledger
            .deduct(&other_id, 10, UsageType::Sms, Some(reference))
            .unwrap_err();
        assert!(matches!(err, BillingError::ReferenceConflict { .. }));

        let err = ledger
            .deduct(&account_id, 10, UsageType::Voice, Some(reference))
            .unwrap_err();
        assert!(matches!(err, BillingError::ReferenceConflict { .. }));
        assert_eq!(ledger.account(&other_id).unwrap().balance, 100);
    }

    #[test]
    fn credit_with_package_activates_it() {
        let ledger = ledger();
        let account = ledger.open_account("Test Practice").unwrap();
        let package = Package::flat("Starter", 500, 500, Some(1), Some(3));

        let tx = ledger
            .credit(&account.account_id, 500, Some(&package), serde_json::Value::Null, None)
            .unwrap();
        assert_eq!(tx.package_id, Some(package.id));

        let account = ledger.account(&account.account_id).unwrap();
        assert_eq!(account.current_package, Some(package.id));
        assert_eq!(account.lifetime_purchased, 500);
    }

    #[test]
    fn last_purchase_timestamp_tracks_newest_purchase() {
        let ledger = ledger();
        let account = ledger.open_account("Test Practice").unwrap();
        assert!(ledger
            .last_purchase_timestamp(&account.account_id)
            .unwrap()
            .is_none());

        ledger
            .credit(&account.account_id, 10, None, serde_json::Value::Null, None)
            .unwrap();
        let second = ledger
            .credit(&account.account_id, 20, None, serde_json::Value::Null, None)
            .unwrap();
        ledger.deduct(&account.account_id, 5, UsageType::Sms, None).unwrap();

        assert_eq!(
            ledger.last_purchase_timestamp(&account.account_id).unwrap(),
            Some(second.created_at)
        );
    }

    #[test]
    fn low_balance_uses_latest_package_amount() {
        let ledger = ledger();
        let package = Package::flat("Starter", 1000, 999, Some(1), Some(1));
        ledger.store().put_package(&package).unwrap();
        let account = ledger.open_account("Test Practice").unwrap();
        let id = account.account_id;

        assert!(!ledger.low_balance_check(&id).unwrap());

        ledger
            .credit(&id, 1000, Some(&package), serde_json::Value::Null, None)
            .unwrap();
        ledger.deduct(&id, 800, UsageType::Sms, None).unwrap();
        assert!(!ledger.low_balance_check(&id).unwrap(), "200 is exactly 20%");

        ledger.deduct(&id, 1, UsageType::Sms, None).unwrap();
        assert!(ledger.low_balance_check(&id).unwrap());
    }

    #[test]
    fn low_balance_falls_back_to_purchase_amount() {
        let ledger = ledger();
        let unknown = Package::flat("Retired", 1000, 999, Some(1), None);
        let account = ledger.open_account("Test Practice").unwrap();
        let id = account.account_id;

        ledger
            .credit(&id, 100, Some(&unknown), serde_json::Value::Null, None)
            .unwrap();
        ledger.deduct(&id, 79, UsageType::Sms, None).unwrap();
        assert!(!ledger.low_balance_check(&id).unwrap());
        ledger.deduct(&id, 2, UsageType::Sms, None).unwrap();
        assert!(ledger.low_balance_check(&id).unwrap());
    }
}
