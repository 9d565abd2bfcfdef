//! Practice accounts and their usage counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, PackageId, UsageType};

/// A balance under this percentage of the last purchased package is low.
pub const LOW_BALANCE_PERCENT: i64 = 20;

/// A billing account for a practice.
///
/// The balance is only ever changed by the ledger, together with a
/// transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The account ID.
    pub account_id: AccountId,

    /// Practice name.
    pub name: String,

    /// Current credit balance. Never negative.
    pub balance: i64,

    /// Package activated by the most recent purchase.
    pub current_package: Option<PackageId>,

    /// Units consumed since the current package was activated.
    pub usage: UsageCounters,

    /// Lifetime credits purchased.
    pub lifetime_purchased: i64,

    /// Lifetime credits used.
    pub lifetime_used: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(account_id: AccountId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            name: name.into(),
            balance: 0,
            current_package: None,
            usage: UsageCounters::default(),
            lifetime_purchased: 0,
            lifetime_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account has sufficient credits for a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: u64) -> bool {
        has_sufficient(self.balance, amount)
    }
}

/// Whether `balance` covers a deduction of `amount`.
#[must_use]
pub fn has_sufficient(balance: i64, amount: u64) -> bool {
    u64::try_from(balance).is_ok_and(|balance| balance >= amount)
}

/// Whether `balance` is below [`LOW_BALANCE_PERCENT`] of `purchased_credits`.
#[must_use]
pub fn is_low_balance(balance: i64, purchased_credits: i64) -> bool {
    balance.saturating_mul(100) < purchased_credits.saturating_mul(LOW_BALANCE_PERCENT)
}

/// Cumulative usage per usage type since the last package activation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    /// SMS units consumed.
    pub sms: u64,
    /// Voice units consumed.
    pub voice: u64,
}

impl UsageCounters {
    /// Units consumed for `usage_type`.
    #[must_use]
    pub const fn get(&self, usage_type: UsageType) -> u64 {
        match usage_type {
            UsageType::Sms => self.sms,
            UsageType::Voice => self.voice,
        }
    }

    /// Add `units` to the counter for `usage_type`.
    pub fn advance(&mut self, usage_type: UsageType, units: u64) {
        let counter = match usage_type {
            UsageType::Sms => &mut self.sms,
            UsageType::Voice => &mut self.voice,
        };
        *counter = counter.saturating_add(units);
    }

    /// Start a new package period.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
