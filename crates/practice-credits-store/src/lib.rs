//! Storage layer for practice credits.
//!
//! This crate persists accounts, packages and the append-only transaction log.
//! Two backends implement the same traits:
//!
//! - [`RocksStore`]: `RocksDB` with column families, CBOR values and
//!   `WriteBatch` commits (feature `rocksdb-backend`, on by default)
//! - [`MemoryStore`]: a single `RwLock` around in-memory maps, for tests and
//!   ephemeral deployments
//!
//! # Column families
//!
//! - `accounts`: account records, keyed by `account_id`
//! - `packages`: package catalog, keyed by `package_id`
//! - `transactions`: credit transactions, keyed by `transaction_id` (ULID)
//! - `transactions_by_account`: index for listing an account's transactions
//! - `references`: idempotency index, `reference_id` to `transaction_id`
//!
//! # Example
//!
//! ```no_run
//! use practice_credits_core::{Account, AccountId};
//! use practice_credits_store::{AccountStore, RocksStore};
//!
//! let store = RocksStore::open("/tmp/practice-credits-db").unwrap();
//!
//! let account = Account::new(AccountId::generate(), "Riverside Dental");
//! store.create_account(&account).unwrap();
//!
//! let balance = store.get_balance(&account.account_id).unwrap();
//! assert_eq!(balance, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entry;
pub mod error;
pub mod memory;
pub mod query;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use entry::{CounterChange, LedgerEntry};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use query::{SortOrder, TransactionQuery};
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use practice_credits_core::{
    Account, AccountId, CreditTransaction, Package, PackageId, ReferenceId, TransactionId,
};

/// Account records and their balances.
pub trait AccountStore: Send + Sync {
    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the id is taken.
    fn create_account(&self, account: &Account) -> Result<()>;

    /// Insert or replace an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// Current balance of an account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn get_balance(&self, account_id: &AccountId) -> Result<i64> {
        self.get_account(account_id)?
            .map(|account| account.balance)
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account_id.to_string(),
            })
    }

    /// Adjust a balance atomically and return the new balance.
    ///
    /// This bypasses the transaction log; ledger mutations go through
    /// [`Store::commit`] instead.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist, or
    /// `StoreError::InsufficientCredits` if the result would be negative.
    fn apply_delta(&self, account_id: &AccountId, delta: i64) -> Result<i64>;
}

/// The append-only transaction log.
pub trait TransactionStore: Send + Sync {
    /// Append a transaction without touching the balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateReference` if the reference id is
    /// already recorded.
    fn append(&self, transaction: &CreditTransaction) -> Result<TransactionId>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>>;

    /// Look up the transaction recorded under an idempotency reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_by_reference(&self, reference_id: &ReferenceId) -> Result<Option<CreditTransaction>>;

    /// Query an account's transactions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn query_transactions(
        &self,
        account_id: &AccountId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>>;
}

/// The package catalog.
pub trait PackageStore: Send + Sync {
    /// Insert or replace a package.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_package(&self, package: &Package) -> Result<()>;

    /// Get a package by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_package(&self, package_id: &PackageId) -> Result<Option<Package>>;

    /// All packages, ordered by credit amount then name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_packages(&self) -> Result<Vec<Package>>;
}

/// A complete store: all three record kinds plus atomic ledger commits.
pub trait Store: AccountStore + TransactionStore + PackageStore {
    /// Commit a ledger entry as one unit: balance delta, transaction append,
    /// reference index and counter change. Returns the updated account.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::DuplicateReference` if the reference id is recorded.
    /// - `StoreError::StaleBalance` if the balance moved since the entry was
    ///   computed.
    /// - `StoreError::InsufficientCredits` if the balance would go negative.
    ///
    /// Nothing is written when an error is returned.
    fn commit(&self, entry: &LedgerEntry) -> Result<Account>;
}

/// Sort key used by [`PackageStore::list_packages`].
pub(crate) fn catalog_order(a: &Package, b: &Package) -> std::cmp::Ordering {
    a.credit_amount
        .cmp(&b.credit_amount)
        .then_with(|| a.name.cmp(&b.name))
}
