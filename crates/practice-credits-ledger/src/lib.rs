//! Balance ledger and usage metering for practice credits.
//!
//! - [`Ledger`]: atomic check-and-deduct and credit operations with an
//!   append-only transaction log and per-account single-writer locking
//! - [`UsageMeter`]: resolves a package's billing mode, prices SMS and voice
//!   usage and charges it through the ledger
//! - [`summarize`]: balance summary with estimated remaining usage
//! - [`CreditPurchaser`]: package purchases through an injected
//!   [`PaymentProcessor`]
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use practice_credits_core::{Package, SmsUsage};
//! use practice_credits_ledger::{Ledger, UsageMeter};
//! use practice_credits_store::{MemoryStore, PackageStore};
//!
//! let store = Arc::new(MemoryStore::new());
//! let package = Package::flat("Starter", 1000, 999, Some(2), Some(5));
//! store.put_package(&package).unwrap();
//!
//! let ledger = Arc::new(Ledger::new(store));
//! let account = ledger.open_account("Riverside Dental").unwrap();
//! ledger
//!     .credit(&account.account_id, 1000, Some(&package), serde_json::Value::Null, None)
//!     .unwrap();
//!
//! let meter = UsageMeter::new(Arc::clone(&ledger));
//! let tx = meter
//!     .send_sms(&account.account_id, SmsUsage::for_message("See you at 3pm", 4), None)
//!     .unwrap();
//! assert_eq!(tx.amount, -8);
//! assert_eq!(tx.balance_after, 992);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod estimate;
pub mod ledger;
pub mod metering;
pub mod payment;
pub mod purchase;

pub use estimate::{summarize, BalanceSummary};
pub use ledger::Ledger;
pub use metering::{quote, UsageMeter};
pub use payment::{ApproveAll, PaymentMethod, PaymentOutcome, PaymentProcessor};
pub use practice_credits_core::has_sufficient;
pub use purchase::{CreditPurchaser, PurchaseReceipt};
