//! Error types for practice credits.

use crate::ids::IdError;
use crate::tiers::TierError;

/// Result type for practice credits operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in practice credits operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Insufficient credits for the operation.
    #[error("insufficient credits: required={required}, available={available}")]
    InsufficientCredits {
        /// Credits the operation needs.
        required: u64,
        /// Current balance.
        available: i64,
    },

    /// The package lacks a rate for the requested usage type.
    #[error("corrupted package {package_id} ({name}): no rate configured for the requested usage")]
    CorruptedPackage {
        /// The broken package.
        package_id: String,
        /// Its display name.
        name: String,
    },

    /// Account not found.
    #[error("account not found: {account_id}")]
    AccountNotFound {
        /// The account ID that was not found.
        account_id: String,
    },

    /// Package not found.
    #[error("package not found: {package_id}")]
    PackageNotFound {
        /// The package ID that was not found.
        package_id: String,
    },

    /// Package exists but can no longer be purchased.
    #[error("package is not active: {package_id}")]
    PackageInactive {
        /// The inactive package.
        package_id: String,
    },

    /// The account has never activated a package.
    #[error("account has no active package: {account_id}")]
    NoActivePackage {
        /// The account without a package.
        account_id: String,
    },

    /// Account already exists.
    #[error("account already exists: {account_id}")]
    AccountAlreadyExists {
        /// The duplicated account ID.
        account_id: String,
    },

    /// A reference id was reused for a different operation.
    #[error("reference {reference_id} already belongs to another transaction")]
    ReferenceConflict {
        /// The conflicting reference.
        reference_id: String,
    },

    /// The payment processor refused the charge.
    #[error("payment declined: {reason}")]
    PaymentDeclined {
        /// Reason reported by the processor.
        reason: String,
    },

    /// Usage request that cannot be metered (no recipients, empty message...).
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid threshold table.
    #[error("invalid threshold table: {0}")]
    InvalidThresholds(#[from] TierError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}
