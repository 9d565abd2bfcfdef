//! Payment processing seam for credit purchases.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use practice_credits_core::{AccountId, ReferenceId, Result};

/// How the customer pays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Method kind, e.g. `credit_card` or `ach`.
    #[serde(rename = "type")]
    pub method_type: String,
    /// Last four digits of a card.
    #[serde(default)]
    pub last_four: Option<String>,
}

impl PaymentMethod {
    /// A card payment.
    #[must_use]
    pub fn card(last_four: impl Into<String>) -> Self {
        Self {
            method_type: "credit_card".into(),
            last_four: Some(last_four.into()),
        }
    }

    /// Human readable form, e.g. `credit_card ending with 4242`.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.last_four, self.method_type.as_str()) {
            (Some(last_four), "credit_card") => {
                format!("{} ending with {last_four}", self.method_type)
            }
            _ => self.method_type.clone(),
        }
    }
}

/// Result of a charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Money was captured.
    Approved {
        /// Processor confirmation code.
        confirmation: String,
    },
    /// The processor refused the charge.
    Declined {
        /// Why.
        reason: String,
    },
}

/// Charges customers for credit packages.
///
/// Called before the ledger is entered; implementations may do network I/O.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Charge `amount_cents` to `method` on behalf of `account_id`.
    ///
    /// `reference_id` is the purchase's idempotency key; a processor that
    /// sees it twice must not capture twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor could not be reached. A refused
    /// charge is `Ok(PaymentOutcome::Declined { .. })`.
    async fn charge(
        &self,
        account_id: &AccountId,
        amount_cents: i64,
        method: &PaymentMethod,
        reference_id: &ReferenceId,
    ) -> Result<PaymentOutcome>;
}

/// Development processor that approves every charge.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

#[async_trait]
impl PaymentProcessor for ApproveAll {
    async fn charge(
        &self,
        account_id: &AccountId,
        amount_cents: i64,
        method: &PaymentMethod,
        reference_id: &ReferenceId,
    ) -> Result<PaymentOutcome> {
        tracing::debug!(
            account_id = %account_id,
            reference_id = %reference_id,
            amount_cents,
            method = %method.describe(),
            "Approving mock payment"
        );
        Ok(PaymentOutcome::Approved {
            confirmation: format!("mock-{reference_id}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_description_includes_last_four() {
        assert_eq!(
            PaymentMethod::card("4242").describe(),
            "credit_card ending with 4242"
        );
        let ach = PaymentMethod {
            method_type: "ach".into(),
            last_four: Some("0001".into()),
        };
        assert_eq!(ach.describe(), "ach");
    }

    #[test]
    fn payment_method_uses_type_key() {
        let method: PaymentMethod =
            serde_json::from_str(r#"{"type":"credit_card","last_four":"1234"}"#).unwrap();
        assert_eq!(method, PaymentMethod::card("1234"));
    }

    #[tokio::test]
    async fn approve_all_approves() {
        let reference = ReferenceId::generate();
        let outcome = ApproveAll
            .charge(&AccountId::generate(), 4999, &PaymentMethod::card("4242"), &reference)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PaymentOutcome::Approved {
                confirmation: format!("mock-{reference}")
            }
        );
    }
}
