//! Usage costing: turn SMS and voice usage into ledger debits.

use std::sync::Arc;

use practice_credits_core::{
    AccountId, BillingError, BillingMode, CreditTransaction, MeteredUsage, Package, ReferenceId,
    Result, SmsUsage, TieredRateCalculator, UsageType, VoiceUsage,
};

use crate::ledger::{Ledger, UsageCharge};

/// Price `units` of `usage_type` under `package`, given the units already
/// consumed in the current package period.
///
/// # Errors
///
/// Returns `BillingError::CorruptedPackage` if a flat package has no rate
/// for `usage_type`.
pub fn quote(package: &Package, usage_type: UsageType, already_consumed: u64, units: u64) -> Result<u64> {
    match &package.billing {
        BillingMode::Flat { .. } => {
            let rate = package
                .flat_rate(usage_type)
                .ok_or_else(|| package.corrupted())?;
            Ok(units.saturating_mul(rate))
        }
        BillingMode::PayAsYouGo { .. } => {
            let table = package
                .threshold_table(usage_type)
                .ok_or_else(|| package.corrupted())?;
            Ok(TieredRateCalculator::new(table).cost_for_additional_units(already_consumed, units))
        }
    }
}

/// Charges metered usage against an account's package.
pub struct UsageMeter {
    ledger: Arc<Ledger>,
}

impl UsageMeter {
    /// Create a meter charging through `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Charge `requested_units` of `usage_type` priced by `package`.
    ///
    /// Pay-as-you-go pricing reads the account's usage counter inside the
    /// ledger's critical section; on success the counter advances by
    /// `requested_units` in the same commit as the debit.
    ///
    /// # Errors
    ///
    /// - `BillingError::InvalidUsage` if `requested_units` is zero.
    /// - `BillingError::CorruptedPackage` if the package cannot price
    ///   `usage_type`.
    /// - `BillingError::InsufficientCredits` if the balance doesn't cover the
    ///   cost.
    /// - `BillingError::AccountNotFound` if the account doesn't exist.
    pub fn purchase_usage(
        &self,
        account_id: &AccountId,
        package: &Package,
        requested_units: u64,
        usage_type: UsageType,
        reference_id: Option<ReferenceId>,
    ) -> Result<CreditTransaction> {
        if requested_units == 0 {
            return Err(BillingError::InvalidUsage(format!(
                "no {usage_type} units requested"
            )));
        }

        tracing::debug!(
            account_id = %account_id,
            package_id = %package.id,
            usage_type = %usage_type,
            units = requested_units,
            "Charging usage"
        );

        let charge = UsageCharge {
            account_id: *account_id,
            usage_type,
            units: requested_units,
            reference_id,
            package: Some(package.clone()),
        };
        self.ledger.charge_usage(charge, |account| {
            quote(package, usage_type, account.usage.get(usage_type), requested_units)
        })
    }

    /// Charge usage against the account's current package.
    ///
    /// A retry with a recorded `reference_id` returns the original
    /// transaction before the package is looked up.
    ///
    /// # Errors
    ///
    /// As [`UsageMeter::purchase_usage`], plus `BillingError::NoActivePackage`
    /// if the account never activated a package and
    /// `BillingError::PackageNotFound` if that package is gone.
    pub fn record(
        &self,
        account_id: &AccountId,
        usage: MeteredUsage,
        reference_id: Option<ReferenceId>,
    ) -> Result<CreditTransaction> {
        let units = usage.units()?;
        if let Some(reference_id) = &reference_id {
            let transaction_type = usage.usage_type().into();
            if let Some(original) = self.ledger.replay(account_id, transaction_type, reference_id)? {
                return Ok(original);
            }
        }
        let package = self.current_package(account_id)?;
        self.purchase_usage(account_id, &package, units, usage.usage_type(), reference_id)
    }

    /// Charge an SMS send: one unit per segment per recipient.
    ///
    /// # Errors
    ///
    /// See [`UsageMeter::record`].
    pub fn send_sms(
        &self,
        account_id: &AccountId,
        usage: SmsUsage,
        reference_id: Option<ReferenceId>,
    ) -> Result<CreditTransaction> {
        self.record(account_id, usage.into(), reference_id)
    }

    /// Charge a voice call: one unit per minute per recipient.
    ///
    /// # Errors
    ///
    /// See [`UsageMeter::record`].
    pub fn place_call(
        &self,
        account_id: &AccountId,
        usage: VoiceUsage,
        reference_id: Option<ReferenceId>,
    ) -> Result<CreditTransaction> {
        self.record(account_id, usage.into(), reference_id)
    }

    /// The package the account is currently billed under.
    ///
    /// # Errors
    ///
    /// `BillingError::NoActivePackage` or `BillingError::PackageNotFound`.
    pub fn current_package(&self, account_id: &AccountId) -> Result<Package> {
        let account = self.ledger.account(account_id)?;
        let package_id = account
            .current_package
            .ok_or_else(|| BillingError::NoActivePackage {
                account_id: account_id.to_string(),
            })?;
        self.ledger
            .store()
            .get_package(&package_id)?
            .ok_or_else(|| BillingError::PackageNotFound {
                package_id: package_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_credits_core::{ThresholdTable, Tier};
    use practice_credits_store::MemoryStore;

    fn two_tier() -> ThresholdTable {
        ThresholdTable::new(vec![Tier::bounded(500, 85), Tier::unbounded(74)]).unwrap()
    }

    #[test]
    fn flat_quote_multiplies() {
        let package = Package::flat("Starter", 100, 100, Some(3), Some(7));
        assert_eq!(quote(&package, UsageType::Sms, 999, 4).unwrap(), 12);
        assert_eq!(quote(&package, UsageType::Voice, 0, 2).unwrap(), 14);
    }

    #[test]
    fn flat_quote_without_rate_is_corrupted() {
        let package = Package::flat("Text only", 100, 100, Some(3), None);
        let err = quote(&package, UsageType::Voice, 0, 1).unwrap_err();
        assert!(matches!(err, BillingError::CorruptedPackage { .. }));
    }

    #[test]
    fn tiered_quote_crosses_boundary() {
        let package = Package::pay_as_you_go("Flex", 1000, 900, two_tier(), two_tier());
        assert_eq!(quote(&package, UsageType::Sms, 499, 2).unwrap(), 159);
        assert_eq!(quote(&package, UsageType::Voice, 0, 0).unwrap(), 0);
    }

    #[test]
    fn retry_replays_after_package_leaves_catalog() {
        let ledger = Arc::new(Ledger::new(Arc::new(MemoryStore::new())));
        // Activated on the account but absent from the catalog.
        let package = Package::flat("Retired", 100, 100, Some(2), Some(5));
        let account = ledger.open_account("Test Practice").unwrap();
        ledger
            .credit(&account.account_id, 100, Some(&package), serde_json::Value::Null, None)
            .unwrap();

        let meter = UsageMeter::new(Arc::clone(&ledger));
        let reference = ReferenceId::generate();
        let first = meter
            .purchase_usage(&account.account_id, &package, 1, UsageType::Sms, Some(reference))
            .unwrap();

        let usage = SmsUsage::for_message("Reminder", 1);
        let err = meter.send_sms(&account.account_id, usage, None).unwrap_err();
        assert!(matches!(err, BillingError::PackageNotFound { .. }));

        let retry = meter
            .send_sms(&account.account_id, usage, Some(reference))
            .unwrap();
        assert_eq!(retry.id, first.id);
        assert_eq!(ledger.account(&account.account_id).unwrap().balance, 98);
    }
}
