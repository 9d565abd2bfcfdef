//! In-memory storage implementation.
//!
//! Every operation takes one `RwLock` on the whole state, which makes
//! [`Store::commit`] trivially atomic. Nothing survives a restart.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use practice_credits_core::{
    Account, AccountId, CreditTransaction, Package, PackageId, ReferenceId, TransactionId,
};

use crate::entry::LedgerEntry;
use crate::error::{Result, StoreError};
use crate::query::TransactionQuery;
use crate::{catalog_order, AccountStore, PackageStore, Store, TransactionStore};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    packages: HashMap<PackageId, Package>,
    transactions: BTreeMap<TransactionId, CreditTransaction>,
    by_account: HashMap<AccountId, BTreeSet<TransactionId>>,
    references: HashMap<ReferenceId, TransactionId>,
}

impl MemoryState {
    fn account(&self, account_id: &AccountId) -> Result<&Account> {
        self.accounts
            .get(account_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account_id.to_string(),
            })
    }

    fn check_reference(&self, reference_id: &ReferenceId) -> Result<()> {
        if self.references.contains_key(reference_id) {
            return Err(StoreError::DuplicateReference {
                reference_id: reference_id.to_string(),
            });
        }
        Ok(())
    }

    fn insert_transaction(&mut self, transaction: &CreditTransaction) {
        self.references
            .insert(transaction.reference_id, transaction.id);
        self.by_account
            .entry(transaction.account_id)
            .or_default()
            .insert(transaction.id);
        self.transactions
            .insert(transaction.id, transaction.clone());
    }
}

/// In-memory [`Store`] backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AccountStore for MemoryStore {
    fn create_account(&self, account: &Account) -> Result<()> {
        let mut state = self.write();
        if state.accounts.contains_key(&account.account_id) {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.account_id.to_string(),
            });
        }
        state.accounts.insert(account.account_id, account.clone());
        Ok(())
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        self.write()
            .accounts
            .insert(account.account_id, account.clone());
        Ok(())
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        Ok(self.read().accounts.get(account_id).cloned())
    }

    fn apply_delta(&self, account_id: &AccountId, delta: i64) -> Result<i64> {
        let mut state = self.write();
        let mut account = state.account(account_id)?.clone();
        account.balance = account
            .balance
            .checked_add(delta)
            .filter(|balance| *balance >= 0)
            .ok_or(StoreError::InsufficientCredits {
                balance: account.balance,
                required: delta.saturating_neg(),
            })?;
        account.updated_at = chrono::Utc::now();

        let balance = account.balance;
        state.accounts.insert(*account_id, account);
        Ok(balance)
    }
}

impl TransactionStore for MemoryStore {
    fn append(&self, transaction: &CreditTransaction) -> Result<TransactionId> {
        let mut state = self.write();
        state.check_reference(&transaction.reference_id)?;
        state.insert_transaction(transaction);
        Ok(transaction.id)
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        Ok(self.read().transactions.get(transaction_id).cloned())
    }

    fn find_by_reference(&self, reference_id: &ReferenceId) -> Result<Option<CreditTransaction>> {
        let state = self.read();
        Ok(state
            .references
            .get(reference_id)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    fn query_transactions(
        &self,
        account_id: &AccountId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>> {
        let state = self.read();
        let Some(ids) = state.by_account.get(account_id) else {
            return Ok(Vec::new());
        };
        let chronological = ids
            .iter()
            .filter_map(|id| state.transactions.get(id).cloned())
            .collect::<Vec<_>>();
        Ok(query.select(chronological.into_iter()))
    }
}

impl PackageStore for MemoryStore {
    fn put_package(&self, package: &Package) -> Result<()> {
        self.write().packages.insert(package.id, package.clone());
        Ok(())
    }

    fn get_package(&self, package_id: &PackageId) -> Result<Option<Package>> {
        Ok(self.read().packages.get(package_id).cloned())
    }

    fn list_packages(&self) -> Result<Vec<Package>> {
        let mut packages: Vec<_> = self.read().packages.values().cloned().collect();
        packages.sort_by(catalog_order);
        Ok(packages)
    }
}

impl Store for MemoryStore {
    fn commit(&self, entry: &LedgerEntry) -> Result<Account> {
        let tx = &entry.transaction;
        let mut state = self.write();

        state.check_reference(&tx.reference_id)?;
        let mut account = state.account(&tx.account_id)?.clone();
        entry.apply_to(&mut account)?;

        state.insert_transaction(tx);
        state.accounts.insert(account.account_id, account.clone());
        Ok(account)
    }
}
