//! Key encoding for the `RocksDB` column families.

use practice_credits_core::{AccountId, PackageId, ReferenceId, TransactionId};

/// Account key: the 16 UUID bytes.
#[must_use]
pub fn account_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Package key: the 16 UUID bytes.
#[must_use]
pub fn package_key(package_id: &PackageId) -> Vec<u8> {
    package_id.as_bytes().to_vec()
}

/// Reference index key: the 16 UUID bytes.
#[must_use]
pub fn reference_key(reference_id: &ReferenceId) -> Vec<u8> {
    reference_id.as_bytes().to_vec()
}

/// Transaction key: the 16 ULID bytes.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Account-transaction index key.
///
/// Format: `account_id (16 bytes) || transaction_id (16 bytes)`
///
/// ULIDs are time-ordered, so an account's transactions sort chronologically.
#[must_use]
pub fn account_transaction_key(account_id: &AccountId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Prefix covering all index keys of one account.
#[must_use]
pub fn account_transactions_prefix(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Decode a transaction ID from a 16 byte value or from the tail of an
/// account-transaction index key. `None` if the slice is too short.
#[must_use]
pub fn transaction_id_from_suffix(bytes: &[u8]) -> Option<TransactionId> {
    let start = bytes.len().checked_sub(16)?;
    let raw: [u8; 16] = bytes[start..].try_into().ok()?;
    Some(TransactionId::from_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_transaction_key_format() {
        let account_id = AccountId::generate();
        let tx_id = TransactionId::generate();
        let key = account_transaction_key(&account_id, &tx_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], account_id.as_bytes());
        assert_eq!(&key[16..], tx_id.to_bytes());
        assert!(key.starts_with(&account_transactions_prefix(&account_id)));
    }

    #[test]
    fn transaction_id_decodes_from_index_key_and_value() {
        let account_id = AccountId::generate();
        let tx_id = TransactionId::generate();

        let key = account_transaction_key(&account_id, &tx_id);
        assert_eq!(transaction_id_from_suffix(&key), Some(tx_id));
        assert_eq!(transaction_id_from_suffix(&transaction_key(&tx_id)), Some(tx_id));
        assert_eq!(transaction_id_from_suffix(&[1, 2, 3]), None);
    }
}
