//! Package catalog handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use practice_credits_core::Package;
use practice_credits_store::PackageStore;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Package response.
#[derive(Debug, Serialize)]
pub struct PackageResponse {
    /// Package ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Credits granted.
    pub credit_amount: i64,
    /// Price in cents.
    pub price_cents: i64,
    /// Whether it can be purchased.
    pub is_active: bool,
    /// Whether usage is volume-priced.
    pub is_pay_as_you_go: bool,
    /// Description.
    pub description: String,
    /// `"Name - N credits"`.
    pub display: String,
}

impl From<&Package> for PackageResponse {
    fn from(package: &Package) -> Self {
        Self {
            id: package.id.to_string(),
            name: package.name.clone(),
            credit_amount: package.credit_amount,
            price_cents: package.price_cents,
            is_active: package.is_active,
            is_pay_as_you_go: package.is_pay_as_you_go(),
            description: package.description.clone(),
            display: package.to_string(),
        }
    }
}

/// Package list response.
#[derive(Debug, Serialize)]
pub struct ListPackagesResponse {
    /// All packages, smallest first.
    pub packages: Vec<PackageResponse>,
}

/// List the package catalog.
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
) -> Result<Json<ListPackagesResponse>, ApiError> {
    let packages = state.store().list_packages()?;
    Ok(Json(ListPackagesResponse {
        packages: packages.iter().map(PackageResponse::from).collect(),
    }))
}
