//! `RocksDB` storage implementation.
//!
//! Ledger commits are a single `WriteBatch` covering the account record, the
//! transaction, its account index entry and its reference index entry.
//! Read-modify-write operations take striped in-process write locks: one
//! stripe for the account and one for the reference id, so commits on
//! unrelated accounts rarely contend.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use practice_credits_core::{
    Account, AccountId, CreditTransaction, Package, PackageId, ReferenceId, TransactionId,
};

use crate::entry::LedgerEntry;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::query::TransactionQuery;
use crate::schema::{all_column_families, cf};
use crate::{catalog_order, AccountStore, PackageStore, Store, TransactionStore};

/// Number of write lock stripes.
const LOCK_STRIPES: usize = 64;

/// Write locks striped by the last byte of a 16 byte id.
struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(id: &[u8; 16]) -> usize {
        usize::from(id[15]) % LOCK_STRIPES
    }

    /// Lock the stripes of `ids`, always in ascending stripe order.
    fn lock(&self, ids: &[&[u8; 16]]) -> Vec<MutexGuard<'_, ()>> {
        let mut stripes: Vec<usize> = ids.iter().map(|id| Self::stripe(id)).collect();
        stripes.sort_unstable();
        stripes.dedup();
        stripes
            .into_iter()
            .map(|i| self.stripes[i].lock().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    locks: StripedLocks,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(
            &opts,
            path.as_ref(),
            cf_descriptors,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(path = %path.as_ref().display(), "Opened RocksDB store");

        Ok(Self {
            db: Arc::new(db),
            locks: StripedLocks::new(),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock_account(&self, account_id: &AccountId) -> Vec<MutexGuard<'_, ()>> {
        self.locks.lock(&[account_id.as_bytes()])
    }

    /// Reference uniqueness spans accounts, so a transaction write holds the
    /// reference's stripe as well as the account's.
    fn lock_transaction(&self, transaction: &CreditTransaction) -> Vec<MutexGuard<'_, ()>> {
        self.locks.lock(&[
            transaction.account_id.as_bytes(),
            transaction.reference_id.as_bytes(),
        ])
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn require_account(&self, account_id: &AccountId) -> Result<Account> {
        self.get_account(account_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account_id.to_string(),
            })
    }

    fn has_reference(&self, reference_id: &ReferenceId) -> Result<bool> {
        let cf = self.cf(cf::REFERENCES)?;
        let found = self
            .db
            .get_cf(&cf, keys::reference_key(reference_id))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(found.is_some())
    }

    /// Add the transaction, its account index entry and its reference entry
    /// to a batch.
    fn batch_transaction(&self, batch: &mut WriteBatch, transaction: &CreditTransaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_account = self.cf(cf::TRANSACTIONS_BY_ACCOUNT)?;
        let cf_refs = self.cf(cf::REFERENCES)?;

        let tx_key = keys::transaction_key(&transaction.id);
        let index_key = keys::account_transaction_key(&transaction.account_id, &transaction.id);
        let value = Self::serialize(transaction)?;

        batch.put_cf(&cf_tx, &tx_key, &value);
        batch.put_cf(&cf_by_account, &index_key, b"");
        batch.put_cf(&cf_refs, keys::reference_key(&transaction.reference_id), &tx_key);
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl AccountStore for RocksStore {
    fn create_account(&self, account: &Account) -> Result<()> {
        let _guard = self.lock_account(&account.account_id);
        if self.get_account(&account.account_id)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.account_id.to_string(),
            });
        }
        self.put_account(account)
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.account_id);
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(account_id))
    }

    fn apply_delta(&self, account_id: &AccountId, delta: i64) -> Result<i64> {
        let _guard = self.lock_account(account_id);
        let mut account = self.require_account(account_id)?;

        account.balance = account
            .balance
            .checked_add(delta)
            .filter(|balance| *balance >= 0)
            .ok_or(StoreError::InsufficientCredits {
                balance: account.balance,
                required: delta.saturating_neg(),
            })?;
        account.updated_at = chrono::Utc::now();

        self.put_account(&account)?;
        Ok(account.balance)
    }
}

impl TransactionStore for RocksStore {
    fn append(&self, transaction: &CreditTransaction) -> Result<TransactionId> {
        let _guard = self.lock_transaction(transaction);
        if self.has_reference(&transaction.reference_id)? {
            return Err(StoreError::DuplicateReference {
                reference_id: transaction.reference_id.to_string(),
            });
        }

        let mut batch = WriteBatch::default();
        self.batch_transaction(&mut batch, transaction)?;
        self.write(batch)?;
        Ok(transaction.id)
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        self.get_value(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn find_by_reference(&self, reference_id: &ReferenceId) -> Result<Option<CreditTransaction>> {
        let cf = self.cf(cf::REFERENCES)?;
        let Some(value) = self
            .db
            .get_cf(&cf, keys::reference_key(reference_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let transaction_id = keys::transaction_id_from_suffix(&value)
            .ok_or_else(|| StoreError::Database(format!("corrupt reference entry: {reference_id}")))?;
        self.get_transaction(&transaction_id)
    }

    fn query_transactions(
        &self,
        account_id: &AccountId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>> {
        let cf_by_account = self.cf(cf::TRANSACTIONS_BY_ACCOUNT)?;
        let prefix = keys::account_transactions_prefix(account_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_account, IteratorMode::From(&prefix, Direction::Forward));

        // Index keys sort by ULID, so this is chronological.
        let mut chronological = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }

            let Some(tx_id) = keys::transaction_id_from_suffix(&key) else {
                tracing::warn!(account_id = %account_id, "Skipping malformed index key");
                continue;
            };
            if let Some(tx) = self.get_transaction(&tx_id)? {
                chronological.push(tx);
            }
        }

        Ok(query.select(chronological.into_iter()))
    }
}

impl PackageStore for RocksStore {
    fn put_package(&self, package: &Package) -> Result<()> {
        let cf = self.cf(cf::PACKAGES)?;
        let value = Self::serialize(package)?;

        self.db
            .put_cf(&cf, keys::package_key(&package.id), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_package(&self, package_id: &PackageId) -> Result<Option<Package>> {
        self.get_value(cf::PACKAGES, &keys::package_key(package_id))
    }

    fn list_packages(&self) -> Result<Vec<Package>> {
        let cf = self.cf(cf::PACKAGES)?;
        let mut packages = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            packages.push(Self::deserialize::<Package>(&value)?);
        }
        packages.sort_by(catalog_order);
        Ok(packages)
    }
}

impl Store for RocksStore {
    fn commit(&self, entry: &LedgerEntry) -> Result<Account> {
        let tx = &entry.transaction;
        let _guard = self.lock_transaction(tx);

        if self.has_reference(&tx.reference_id)? {
            return Err(StoreError::DuplicateReference {
                reference_id: tx.reference_id.to_string(),
            });
        }

        let mut account = self.require_account(&tx.account_id)?;
        entry.apply_to(&mut account)?;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.account_id),
            Self::serialize(&account)?,
        );
        self.batch_transaction(&mut batch, tx)?;
        self.write(batch)?;

        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CounterChange;
    use practice_credits_core::{ThresholdTable, TransactionType, UsageType};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn funded_account(store: &RocksStore, balance: i64) -> Account {
        let mut account = Account::new(AccountId::generate(), "Test Practice");
        account.balance = balance;
        store.create_account(&account).unwrap();
        account
    }

    fn voice_entry(account: &Account, amount: i64, minutes: u64) -> LedgerEntry {
        let tx = CreditTransaction::usage(
            account.account_id,
            UsageType::Voice,
            amount,
            account.balance - amount,
            Some(minutes),
            ReferenceId::generate(),
            serde_json::json!({ "call": "follow-up" }),
        );
        LedgerEntry::new(tx).with_counter(CounterChange::Advance {
            usage_type: UsageType::Voice,
            units: minutes,
        })
    }

    #[test]
    fn account_crud() {
        let (store, _dir) = create_test_store();
        let account = funded_account(&store, 250);

        let retrieved = store.get_account(&account.account_id).unwrap().unwrap();
        assert_eq!(retrieved, account);
        assert_eq!(store.get_balance(&account.account_id).unwrap(), 250);

        let err = store.create_account(&account).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert!(store.get_account(&AccountId::generate()).unwrap().is_none());
    }

    #[test]
    fn apply_delta_checks_balance() {
        let (store, _dir) = create_test_store();
        let account = funded_account(&store, 100);

        assert_eq!(store.apply_delta(&account.account_id, 50).unwrap(), 150);
        let err = store.apply_delta(&account.account_id, -151).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCredits { .. }));

        let err = store.apply_delta(&AccountId::generate(), 1).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn commit_writes_everything_together() {
        let (store, _dir) = create_test_store();
        let account = funded_account(&store, 1000);
        let entry = voice_entry(&account, 300, 2);

        let updated = store.commit(&entry).unwrap();
        assert_eq!(updated.balance, 700);
        assert_eq!(updated.usage.voice, 2);
        assert_eq!(store.get_account(&account.account_id).unwrap().unwrap(), updated);

        let tx = store.get_transaction(&entry.transaction.id).unwrap().unwrap();
        assert_eq!(tx, entry.transaction);
        assert_eq!(tx.transaction_type, TransactionType::VoiceUsage);

        let by_ref = store
            .find_by_reference(&entry.transaction.reference_id)
            .unwrap()
            .unwrap();
        assert_eq!(by_ref.id, tx.id);
    }

    #[test]
    fn rejected_commit_writes_nothing() {
        let (store, _dir) = create_test_store();
        let account = funded_account(&store, 100);
        let mut entry = voice_entry(&account, 300, 2);
        entry.transaction.balance_after = -200;

        let err = store.commit(&entry).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCredits { .. }));
        assert_eq!(store.get_balance(&account.account_id).unwrap(), 100);
        assert!(store.get_transaction(&entry.transaction.id).unwrap().is_none());
    }

    #[test]
    fn duplicate_reference_rejected() {
        let (store, _dir) = create_test_store();
        let account = funded_account(&store, 1000);
        let entry = voice_entry(&account, 100, 1);
        store.append(&entry.transaction).unwrap();

        let err = store.append(&entry.transaction).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReference { .. }));
        let err = store.commit(&entry).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReference { .. }));
    }

    #[test]
    fn transactions_are_listed_per_account() {
        let (store, _dir) = create_test_store();
        let mut account = funded_account(&store, 1000);
        let other = funded_account(&store, 1000);
        store.commit(&voice_entry(&other, 10, 1)).unwrap();

        for minutes in 1..=5 {
            account = store.commit(&voice_entry(&account, 10, minutes)).unwrap();
        }

        let newest = store
            .query_transactions(&account.account_id, &TransactionQuery::newest_first().page(0, 2))
            .unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].units, Some(5));
        assert_eq!(newest[1].units, Some(4));

        let all = store
            .query_transactions(&account.account_id, &TransactionQuery::oldest_first())
            .unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].units, Some(1));
    }

    #[test]
    fn packages_roundtrip_through_cbor() {
        let (store, _dir) = create_test_store();
        let payg = Package::pay_as_you_go(
            "Growth",
            2000,
            1800,
            ThresholdTable::default_sms(),
            ThresholdTable::default_voice(),
        );
        let flat = Package::flat("Starter", 500, 500, Some(100), None);
        store.put_package(&payg).unwrap();
        store.put_package(&flat).unwrap();

        assert_eq!(store.get_package(&payg.id).unwrap(), Some(payg.clone()));
        let listed = store.list_packages().unwrap();
        assert_eq!(listed, vec![flat, payg]);
    }

    #[test]
    fn data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let account_id = {
            let store = RocksStore::open(temp_dir.path()).unwrap();
            let account = funded_account(&store, 80);
            store.commit(&voice_entry(&account, 30, 1)).unwrap();
            account.account_id
        };

        let store = RocksStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.get_balance(&account_id).unwrap(), 50);
    }

    #[test]
    fn write_locks_are_striped() {
        let locks = StripedLocks::new();
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        a[15] = 1;
        b[15] = 2;

        let held = locks.lock(&[&a]);
        assert_eq!(held.len(), 1);
        assert!(locks.stripes[StripedLocks::stripe(&b)].try_lock().is_ok());
        assert!(locks.stripes[StripedLocks::stripe(&a)].try_lock().is_err());
        drop(held);

        // Same stripe twice is locked once.
        assert_eq!(locks.lock(&[&a, &a]).len(), 1);
        assert_eq!(locks.lock(&[&b, &a]).len(), 2);
    }

    #[test]
    fn commits_on_other_accounts_proceed_while_one_is_locked() {
        let (store, _dir) = create_test_store();
        let first = funded_account(&store, 100);
        let mut second = funded_account(&store, 100);
        let mut entry = voice_entry(&second, 10, 2);
        while StripedLocks::stripe(second.account_id.as_bytes())
            == StripedLocks::stripe(first.account_id.as_bytes())
            || StripedLocks::stripe(entry.transaction.reference_id.as_bytes())
                == StripedLocks::stripe(first.account_id.as_bytes())
        {
            second = funded_account(&store, 100);
            entry = voice_entry(&second, 10, 2);
        }

        let _held = store.lock_account(&first.account_id);
        let updated = store.commit(&entry).unwrap();
        assert_eq!(updated.balance, 90);
    }
}
