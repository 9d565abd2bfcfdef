//! Balance summaries with estimated remaining usage.
//!
//! Estimates read without taking the account lock; they are advisory and may
//! trail a concurrent debit.

use chrono::{DateTime, Utc};
use serde::Serialize;

use practice_credits_core::{
    AccountId, BillingMode, CreditTransaction, Package, PackageId, Result,
    TieredRateCalculator, TransactionType, UsageType,
};
use practice_credits_store::{PackageStore, TransactionQuery};

use crate::ledger::Ledger;

/// What an account has left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    /// The account.
    pub account_id: AccountId,
    /// Current balance in credits.
    pub balance: i64,
    /// Package usage is billed under.
    pub package_id: Option<PackageId>,
    /// When credits were last purchased.
    pub last_purchase: Option<DateTime<Utc>>,
    /// SMS segments the balance still covers.
    pub estimated_remaining_sms: u64,
    /// Voice minutes the balance still covers.
    pub estimated_remaining_voice: u64,
    /// Balance below 20% of the last purchased package.
    pub low_balance: bool,
}

/// Summarize an account's balance.
///
/// # Errors
///
/// - `BillingError::AccountNotFound` if the account doesn't exist.
/// - `BillingError::CorruptedPackage` if the current package is flat-rate
///   with neither an SMS nor a voice rate.
pub fn summarize(ledger: &Ledger, account_id: &AccountId) -> Result<BalanceSummary> {
    let account = ledger.account(account_id)?;
    let last_purchase = ledger.last_purchase(account_id)?;

    let package = match account.current_package {
        Some(package_id) => {
            let package = ledger.store().get_package(&package_id)?;
            if package.is_none() {
                tracing::warn!(
                    account_id = %account_id,
                    package_id = %package_id,
                    "Current package missing from catalog"
                );
            }
            package
        }
        None => None,
    };

    let (sms, voice) = match &package {
        Some(package) => estimate(ledger, account_id, account.balance, package)?,
        None => (0, 0),
    };

    Ok(BalanceSummary {
        account_id: *account_id,
        balance: account.balance,
        package_id: account.current_package,
        last_purchase: last_purchase.as_ref().map(|tx| tx.created_at),
        estimated_remaining_sms: sms,
        estimated_remaining_voice: voice,
        low_balance: ledger.low_balance_check(account_id)?,
    })
}

fn estimate(
    ledger: &Ledger,
    account_id: &AccountId,
    balance: i64,
    package: &Package,
) -> Result<(u64, u64)> {
    match &package.billing {
        BillingMode::Flat { .. } => {
            let sms = package.flat_rate(UsageType::Sms);
            let voice = package.flat_rate(UsageType::Voice);
            if sms.is_none() && voice.is_none() {
                return Err(package.corrupted());
            }
            let budget = u64::try_from(balance).unwrap_or(0);
            Ok((
                sms.map_or(0, |rate| budget / rate),
                voice.map_or(0, |rate| budget / rate),
            ))
        }
        BillingMode::PayAsYouGo { sms, voice } => {
            // Transaction ids are time-ordered, so the period is everything
            // after the activating purchase. Top-ups without a package leave
            // the usage counters running and do not start a period.
            let period_start = last_activation(ledger, account_id)?.map(|tx| tx.id);
            let period = |transaction_type| -> Result<Vec<CreditTransaction>> {
                let query = TransactionQuery::oldest_first().of_type(transaction_type);
                let mut txs = ledger.history(account_id, &query)?;
                txs.retain(|tx| period_start.map_or(true, |start| tx.id > start));
                Ok(txs)
            };
            Ok((
                TieredRateCalculator::new(sms)
                    .remaining_units_for_balance(balance, &period(TransactionType::SmsUsage)?),
                TieredRateCalculator::new(voice)
                    .remaining_units_for_balance(balance, &period(TransactionType::VoiceUsage)?),
            ))
        }
    }
}

/// The purchase that activated the current package.
fn last_activation(ledger: &Ledger, account_id: &AccountId) -> Result<Option<CreditTransaction>> {
    let query = TransactionQuery::newest_first().of_type(TransactionType::Purchase);
    Ok(ledger
        .history(account_id, &query)?
        .into_iter()
        .find(|tx| tx.package_id.is_some()))
}
