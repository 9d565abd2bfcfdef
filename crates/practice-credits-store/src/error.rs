//! Error types for practice credits storage.

use practice_credits_core::BillingError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record ("account", "package", ...).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that collided.
        id: String,
    },

    /// A balance change would leave the account negative.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Amount the change needed.
        required: i64,
    },

    /// A transaction with this reference id is already recorded.
    #[error("duplicate reference: {reference_id}")]
    DuplicateReference {
        /// The reused reference id.
        reference_id: String,
    },

    /// The balance moved between the ledger reading it and committing.
    #[error("stale balance: expected={expected}, actual={actual}")]
    StaleBalance {
        /// Balance the entry was computed from.
        expected: i64,
        /// Balance found at commit time.
        actual: i64,
    },
}

impl From<StoreError> for BillingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity: "account", id } => Self::AccountNotFound { account_id: id },
            StoreError::NotFound { entity: "package", id } => Self::PackageNotFound { package_id: id },
            StoreError::AlreadyExists { entity: "account", id } => {
                Self::AccountAlreadyExists { account_id: id }
            }
            StoreError::InsufficientCredits { balance, required } => Self::InsufficientCredits {
                required: u64::try_from(required).unwrap_or(0),
                available: balance,
            },
            StoreError::DuplicateReference { reference_id } => {
                Self::ReferenceConflict { reference_id }
            }
            StoreError::Serialization(msg) => Self::Serialization(msg),
            err @ (StoreError::Database(_)
            | StoreError::NotFound { .. }
            | StoreError::AlreadyExists { .. }
            | StoreError::StaleBalance { .. }) => Self::Storage(err.to_string()),
        }
    }
}
