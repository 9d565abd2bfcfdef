//! Credit packages and their billing modes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BillingError, PackageId, ThresholdTable, UsageType};

/// A priced bundle of credits that a practice can buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Package ID.
    pub id: PackageId,

    /// Display name.
    pub name: String,

    /// Credits granted on purchase.
    pub credit_amount: i64,

    /// Price in cents.
    pub price_cents: i64,

    /// Whether the package can still be bought.
    pub is_active: bool,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// How usage is priced while this package is active.
    pub billing: BillingMode,

    /// When the package was created.
    pub created_at: DateTime<Utc>,
}

impl Package {
    /// A package with fixed per-unit rates. A missing rate makes that usage
    /// type unavailable.
    #[must_use]
    pub fn flat(
        name: impl Into<String>,
        credit_amount: i64,
        price_cents: i64,
        credit_per_sms: Option<u64>,
        credit_per_voice: Option<u64>,
    ) -> Self {
        Self::with_billing(
            name,
            credit_amount,
            price_cents,
            BillingMode::Flat {
                credit_per_sms,
                credit_per_voice,
            },
        )
    }

    /// A pay-as-you-go package priced by threshold tables.
    #[must_use]
    pub fn pay_as_you_go(
        name: impl Into<String>,
        credit_amount: i64,
        price_cents: i64,
        sms: ThresholdTable,
        voice: ThresholdTable,
    ) -> Self {
        Self::with_billing(
            name,
            credit_amount,
            price_cents,
            BillingMode::PayAsYouGo { sms, voice },
        )
    }

    fn with_billing(
        name: impl Into<String>,
        credit_amount: i64,
        price_cents: i64,
        billing: BillingMode,
    ) -> Self {
        Self {
            id: PackageId::generate(),
            name: name.into(),
            credit_amount,
            price_cents,
            is_active: true,
            description: String::new(),
            billing,
            created_at: Utc::now(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether usage is priced by threshold tables.
    #[must_use]
    pub const fn is_pay_as_you_go(&self) -> bool {
        matches!(self.billing, BillingMode::PayAsYouGo { .. })
    }

    /// The flat rate for `usage_type`. Zero rates count as missing.
    #[must_use]
    pub fn flat_rate(&self, usage_type: UsageType) -> Option<u64> {
        let rate = match (&self.billing, usage_type) {
            (BillingMode::Flat { credit_per_sms, .. }, UsageType::Sms) => *credit_per_sms,
            (BillingMode::Flat { credit_per_voice, .. }, UsageType::Voice) => *credit_per_voice,
            (BillingMode::PayAsYouGo { .. }, _) => None,
        };
        rate.filter(|rate| *rate > 0)
    }

    /// The threshold table for `usage_type` on a pay-as-you-go package.
    #[must_use]
    pub const fn threshold_table(&self, usage_type: UsageType) -> Option<&ThresholdTable> {
        match &self.billing {
            BillingMode::PayAsYouGo { sms, voice } => match usage_type {
                UsageType::Sms => Some(sms),
                UsageType::Voice => Some(voice),
            },
            BillingMode::Flat { .. } => None,
        }
    }

    /// The error reported when this package cannot price a request.
    #[must_use]
    pub fn corrupted(&self) -> BillingError {
        BillingError::CorruptedPackage {
            package_id: self.id.to_string(),
            name: self.name.clone(),
        }
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {} credits", self.name, self.credit_amount)
    }
}

/// How a package prices usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum BillingMode {
    /// Fixed credits per unit.
    Flat {
        /// Credits per SMS segment.
        credit_per_sms: Option<u64>,
        /// Credits per voice minute.
        credit_per_voice: Option<u64>,
    },

    /// Volume-tiered pricing; cost per unit drops as usage grows.
    PayAsYouGo {
        /// SMS tiers.
        sms: ThresholdTable,
        /// Voice tiers.
        voice: ThresholdTable,
    },
}
