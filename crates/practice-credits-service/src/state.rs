//! Application state.

use std::sync::Arc;

use practice_credits_core::{BillingError, Package};
use practice_credits_ledger::{ApproveAll, CreditPurchaser, Ledger, PaymentProcessor, UsageMeter};
use practice_credits_store::{PackageStore, Store};

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The balance ledger.
    pub ledger: Arc<Ledger>,

    /// Usage metering over the ledger.
    pub meter: Arc<UsageMeter>,

    /// Package purchases.
    pub purchaser: Arc<CreditPurchaser>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create application state with the development payment processor.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        tracing::warn!("Using mock payment processor - every charge is approved");
        Self::with_processor(store, config, Arc::new(ApproveAll))
    }

    /// Create application state with a specific payment processor.
    #[must_use]
    pub fn with_processor(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(store));
        Self {
            meter: Arc::new(UsageMeter::new(Arc::clone(&ledger))),
            purchaser: Arc::new(CreditPurchaser::new(Arc::clone(&ledger), processor)),
            ledger,
            config,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        self.ledger.store()
    }

    /// Insert catalog packages the store doesn't know yet. Returns how many
    /// were added.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog cannot be written.
    pub fn seed_catalog(&self, catalog: &[Package]) -> Result<usize, BillingError> {
        let mut added = 0;
        for package in catalog {
            if self.store().get_package(&package.id)?.is_none() {
                self.store().put_package(package)?;
                added += 1;
            }
        }
        tracing::info!(added, total = catalog.len(), "Package catalog seeded");
        Ok(added)
    }
}
