//! Credit transaction types.
//!
//! Every balance change is recorded as an immutable [`CreditTransaction`].
//! Transactions are append-only: the sum of an account's transaction amounts
//! is its balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, PackageId, ReferenceId, TransactionId, UsageType};

/// A credit transaction representing a balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The account whose balance was affected.
    pub account_id: AccountId,

    /// Signed amount in credits. Positive for purchases, negative for usage.
    pub amount: i64,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Package bought by a purchase.
    pub package_id: Option<PackageId>,

    /// Idempotency key.
    pub reference_id: ReferenceId,

    /// Balance after this transaction.
    pub balance_after: i64,

    /// Metered units consumed by a usage transaction.
    pub units: Option<u64>,

    /// Human-readable description.
    pub description: String,

    /// Additional metadata (payment status, campaign details...).
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Create a purchase transaction crediting `amount` credits.
    #[must_use]
    pub fn purchase(
        account_id: AccountId,
        amount: i64,
        balance_after: i64,
        package_id: Option<PackageId>,
        reference_id: ReferenceId,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            amount: amount.abs(),
            transaction_type: TransactionType::Purchase,
            package_id,
            reference_id,
            balance_after,
            units: None,
            description: format!("Purchase of {} credits", amount.abs()),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Create a usage transaction debiting `amount` credits.
    ///
    /// `amount` is stored negated regardless of the sign passed in.
    #[must_use]
    pub fn usage(
        account_id: AccountId,
        usage_type: UsageType,
        amount: i64,
        balance_after: i64,
        units: Option<u64>,
        reference_id: ReferenceId,
        metadata: serde_json::Value,
    ) -> Self {
        let description = match units {
            Some(units) => format!("{usage_type} usage: {units} units"),
            None => format!("{usage_type} usage"),
        };
        Self {
            id: TransactionId::generate(),
            account_id,
            amount: -amount.abs(),
            transaction_type: usage_type.into(),
            package_id: None,
            reference_id,
            balance_after,
            units,
            description,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// The usage type of a usage transaction.
    #[must_use]
    pub const fn usage_type(&self) -> Option<UsageType> {
        self.transaction_type.usage_type()
    }
}

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credits bought with a package.
    Purchase,

    /// Credits spent on SMS.
    SmsUsage,

    /// Credits spent on voice calls.
    VoiceUsage,
}

impl TransactionType {
    /// Check if this transaction type adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Purchase)
    }

    /// Check if this transaction type removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        !self.is_credit()
    }

    /// The usage type behind a debit.
    #[must_use]
    pub const fn usage_type(&self) -> Option<UsageType> {
        match self {
            Self::Purchase => None,
            Self::SmsUsage => Some(UsageType::Sms),
            Self::VoiceUsage => Some(UsageType::Voice),
        }
    }

    /// Get the transaction type name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::SmsUsage => "sms_usage",
            Self::VoiceUsage => "voice_usage",
        }
    }
}

impl From<UsageType> for TransactionType {
    fn from(usage_type: UsageType) -> Self {
        match usage_type {
            UsageType::Sms => Self::SmsUsage,
            UsageType::Voice => Self::VoiceUsage,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
