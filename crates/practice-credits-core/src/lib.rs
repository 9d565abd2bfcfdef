//! Core types and pricing math for practice credits.
//!
//! This crate provides the foundational types used throughout the platform:
//!
//! - **Identifiers**: `AccountId`, `PackageId`, `ReferenceId`, `TransactionId`
//! - **Accounts**: `Account`, `UsageCounters`
//! - **Packages**: `Package`, `BillingMode`
//! - **Credits**: `CreditTransaction`, `TransactionType`
//! - **Usage**: `UsageType`, `SmsUsage`, `VoiceUsage`
//! - **Pricing**: `ThresholdTable`, `TieredRateCalculator`
//!
//! # Credits
//!
//! Credits are whole numbers. Practices buy them in packages and spend them
//! on SMS segments and voice minutes, either at a flat per-unit rate or on a
//! pay-as-you-go scale where the per-unit rate drops as usage grows within a
//! package period.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod credits;
pub mod error;
pub mod ids;
pub mod package;
pub mod rates;
pub mod tiers;
pub mod usage;

pub use account::{has_sufficient, is_low_balance, Account, UsageCounters, LOW_BALANCE_PERCENT};
pub use credits::{CreditTransaction, TransactionType};
pub use error::{BillingError, Result};
pub use ids::{AccountId, IdError, PackageId, ReferenceId, TransactionId};
pub use package::{BillingMode, Package};
pub use rates::TieredRateCalculator;
pub use tiers::{ThresholdTable, Tier, TierCursor, TierError};
pub use usage::{segment_count, MeteredUsage, SmsUsage, UsageType, VoiceUsage, SMS_SEGMENT_LENGTH};
