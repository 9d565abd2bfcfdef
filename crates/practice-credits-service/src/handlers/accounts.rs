//! Account handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use practice_credits_core::{Account, AccountId};

use super::parse_id;
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Account ID.
    pub account_id: String,
    /// Practice name.
    pub name: String,
    /// Current balance in credits.
    pub balance: i64,
    /// Package usage is billed under.
    pub current_package: Option<String>,
    /// SMS segments used this package period.
    pub sms_used: u64,
    /// Voice minutes used this package period.
    pub voice_used: u64,
    /// Lifetime credits purchased.
    pub lifetime_purchased: i64,
    /// Lifetime credits used.
    pub lifetime_used: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.account_id.to_string(),
            name: account.name.clone(),
            balance: account.balance,
            current_package: account.current_package.map(|id| id.to_string()),
            sms_used: account.usage.sms,
            voice_used: account.usage.voice,
            lifetime_purchased: account.lifetime_purchased,
            lifetime_used: account.lifetime_used,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Practice name.
    pub name: String,
}

/// Open a new practice account with a zero balance.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }

    let account = state.ledger.open_account(name)?;
    tracing::debug!(
        service = %auth.service_name,
        account_id = %account.account_id,
        "Account created via API"
    );

    Ok(Json(AccountResponse::from(&account)))
}

/// Get an account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(account_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account_id: AccountId = parse_id(&account_id, "account ID")?;
    let account = state.ledger.account(&account_id)?;
    Ok(Json(AccountResponse::from(&account)))
}
