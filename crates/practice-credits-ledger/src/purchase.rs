//! Credit package purchases.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use practice_credits_core::{
    AccountId, BillingError, CreditTransaction, PackageId, ReferenceId, Result, TransactionType,
};
use practice_credits_store::PackageStore;

use crate::ledger::Ledger;
use crate::payment::{PaymentMethod, PaymentOutcome, PaymentProcessor};

/// Outcome of a package purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    /// The purchase transaction.
    pub transaction: CreditTransaction,
    /// Credits added to the balance.
    pub credits_added: i64,
    /// Balance after the purchase.
    pub new_balance: i64,
    /// Whether this receipt was replayed from an earlier request with the
    /// same reference id.
    pub replayed: bool,
}

impl PurchaseReceipt {
    fn new(transaction: CreditTransaction, replayed: bool) -> Self {
        Self {
            credits_added: transaction.amount,
            new_balance: transaction.balance_after,
            transaction,
            replayed,
        }
    }
}

/// Purchases in progress, keyed by reference id. An entry lives only while
/// some purchase holds or waits for it.
#[derive(Default)]
struct InFlight {
    references: Mutex<HashMap<ReferenceId, Arc<AsyncMutex<()>>>>,
}

impl InFlight {
    async fn enter(&self, reference_id: ReferenceId) -> InFlightGuard<'_> {
        let slot = {
            let mut references = self.references.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(references.entry(reference_id).or_default())
        };
        let held = Arc::clone(&slot).lock_owned().await;
        InFlightGuard {
            in_flight: self,
            reference_id,
            slot,
            _held: held,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
    reference_id: ReferenceId,
    slot: Arc<AsyncMutex<()>>,
    _held: OwnedMutexGuard<()>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut references = self
            .in_flight
            .references
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map, `slot` and `_held` account for three; any more is a waiter.
        if Arc::strong_count(&self.slot) == 3 {
            references.remove(&self.reference_id);
        }
    }
}

/// Sells credit packages: charge the payment method, then credit the ledger.
pub struct CreditPurchaser {
    ledger: Arc<Ledger>,
    processor: Arc<dyn PaymentProcessor>,
    in_flight: InFlight,
}

impl CreditPurchaser {
    /// Create a purchaser.
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            ledger,
            processor,
            in_flight: InFlight::default(),
        }
    }

    /// Buy a package for an account.
    ///
    /// Payment happens before the ledger is entered. A declined payment
    /// writes nothing to the ledger and is only logged. Retrying with the
    /// same `reference_id` returns the original receipt without charging
    /// again, including when the retry races the original request. Without a
    /// `reference_id` one is generated and sent to the processor as the
    /// idempotency key.
    ///
    /// # Errors
    ///
    /// - `BillingError::AccountNotFound`, `BillingError::PackageNotFound` or
    ///   `BillingError::PackageInactive`.
    /// - `BillingError::PaymentDeclined` if the processor refuses the charge.
    /// - `BillingError::ReferenceConflict` if the reference id was used for
    ///   something else.
    pub async fn purchase_package(
        &self,
        account_id: &AccountId,
        package_id: &PackageId,
        method: &PaymentMethod,
        reference_id: Option<ReferenceId>,
    ) -> Result<PurchaseReceipt> {
        let reference_id = reference_id.unwrap_or_else(ReferenceId::generate);
        let _in_flight = self.in_flight.enter(reference_id).await;

        if let Some(original) = self.ledger.find_by_reference(&reference_id)? {
            if original.account_id != *account_id
                || original.transaction_type != TransactionType::Purchase
            {
                return Err(BillingError::ReferenceConflict {
                    reference_id: reference_id.to_string(),
                });
            }
            tracing::debug!(reference_id = %reference_id, "Replaying purchase receipt");
            return Ok(PurchaseReceipt::new(original, true));
        }

        self.ledger.account(account_id)?;
        let package = self
            .ledger
            .store()
            .get_package(package_id)?
            .ok_or_else(|| BillingError::PackageNotFound {
                package_id: package_id.to_string(),
            })?;
        if !package.is_active {
            return Err(BillingError::PackageInactive {
                package_id: package_id.to_string(),
            });
        }
        let credits = u64::try_from(package.credit_amount)
            .ok()
            .filter(|credits| *credits > 0)
            .ok_or_else(|| {
                BillingError::InvalidAmount(format!("package {} grants no credits", package.id))
            })?;

        let outcome = self
            .processor
            .charge(account_id, package.price_cents, method, &reference_id)
            .await?;

        let confirmation = match outcome {
            PaymentOutcome::Approved { confirmation } => confirmation,
            PaymentOutcome::Declined { reason } => {
                tracing::warn!(
                    account_id = %account_id,
                    package_id = %package_id,
                    reference_id = %reference_id,
                    amount_cents = package.price_cents,
                    payment_type = %method.method_type,
                    reason = %reason,
                    "Payment declined"
                );
                return Err(BillingError::PaymentDeclined { reason });
            }
        };

        let metadata = serde_json::json!({
            "status": "success",
            "payment_type": method.method_type,
            "confirmation": confirmation,
            "info": format!(
                "Purchase of {} on {} using {} succeeded.",
                package.name,
                chrono::Utc::now().to_rfc3339(),
                method.describe()
            ),
        });

        let transaction =
            self.ledger
                .credit(account_id, credits, Some(&package), metadata, Some(reference_id))?;

        tracing::info!(
            account_id = %account_id,
            package_id = %package_id,
            credits = transaction.amount,
            balance = transaction.balance_after,
            "Package purchased"
        );

        Ok(PurchaseReceipt::new(transaction, false))
    }
}
