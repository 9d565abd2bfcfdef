//! Credit purchase, balance and transaction handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use practice_credits_core::{AccountId, CreditTransaction, PackageId, ReferenceId, TransactionType};
use practice_credits_ledger::{summarize, BalanceSummary, PaymentMethod, PurchaseReceipt};
use practice_credits_store::TransactionQuery;

use super::{parse_id, parse_optional_id};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Transactions per history page.
pub const PAGE_SIZE: usize = 20;

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Account the transaction belongs to.
    pub account_id: String,
    /// Signed amount: positive for purchases, negative for usage.
    pub amount: i64,
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Package the transaction was priced under.
    pub package_id: Option<String>,
    /// Idempotency reference.
    pub reference_id: String,
    /// Balance after this transaction.
    pub balance_after: i64,
    /// Units consumed, for usage.
    pub units: Option<u64>,
    /// Description.
    pub description: String,
    /// Payment details or usage details.
    pub metadata: serde_json::Value,
    /// Timestamp.
    pub created_at: String,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            account_id: tx.account_id.to_string(),
            amount: tx.amount,
            transaction_type: tx.transaction_type,
            package_id: tx.package_id.map(|id| id.to_string()),
            reference_id: tx.reference_id.to_string(),
            balance_after: tx.balance_after,
            units: tx.units,
            description: tx.description.clone(),
            metadata: tx.metadata.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// Purchase request.
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    /// Buying account.
    pub account_id: String,
    /// Package to buy.
    pub package_id: String,
    /// How the practice pays.
    pub payment_method: PaymentMethod,
    /// Idempotency key; retries with the same key are not charged again.
    pub reference_id: Option<String>,
}

/// Purchase response.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    /// The purchase transaction.
    pub transaction: TransactionResponse,
    /// Credits added.
    pub credits_added: i64,
    /// Balance after the purchase.
    pub new_balance: i64,
    /// Whether this is a replay of an earlier request.
    pub replayed: bool,
    /// Where the receipt can be fetched again.
    pub receipt_url: String,
}

impl From<PurchaseReceipt> for PurchaseResponse {
    fn from(receipt: PurchaseReceipt) -> Self {
        Self {
            receipt_url: format!(
                "/v1/credits/receipts/{}",
                receipt.transaction.reference_id
            ),
            transaction: TransactionResponse::from(&receipt.transaction),
            credits_added: receipt.credits_added,
            new_balance: receipt.new_balance,
            replayed: receipt.replayed,
        }
    }
}

/// Buy a credit package.
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let account_id: AccountId = parse_id(&body.account_id, "account ID")?;
    let package_id: PackageId = parse_id(&body.package_id, "package ID")?;
    let reference_id: Option<ReferenceId> =
        parse_optional_id(body.reference_id.as_deref(), "reference ID")?;

    tracing::debug!(
        service = %auth.service_name,
        account_id = %account_id,
        package_id = %package_id,
        "Purchase requested"
    );

    let receipt = state
        .purchaser
        .purchase_package(&account_id, &package_id, &body.payment_method, reference_id)
        .await?;

    Ok(Json(PurchaseResponse::from(receipt)))
}

/// Query naming an account.
#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    /// Account ID.
    pub account_id: String,
}

/// Balance with estimated remaining usage under the current package.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Query(query): Query<AccountQuery>,
) -> Result<Json<BalanceSummary>, ApiError> {
    let account_id: AccountId = parse_id(&query.account_id, "account ID")?;
    Ok(Json(summarize(&state.ledger, &account_id)?))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Account ID.
    pub account_id: String,
    /// 1-based page number (default: 1).
    #[serde(default = "default_page")]
    pub page: usize,
    /// Only this transaction type.
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    /// Only transactions after this instant.
    pub since: Option<DateTime<Utc>>,
}

const fn default_page() -> usize {
    1
}

/// One page of transaction history.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Page number returned.
    pub page: usize,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List an account's transactions, newest first, [`PAGE_SIZE`] per page.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let account_id: AccountId = parse_id(&query.account_id, "account ID")?;
    if query.page == 0 {
        return Err(ApiError::BadRequest("page starts at 1".into()));
    }

    let mut filter = TransactionQuery::newest_first().since(query.since);
    if let Some(kind) = query.transaction_type {
        filter = filter.of_type(kind);
    }
    // One extra row tells us whether another page exists.
    let offset = (query.page - 1).saturating_mul(PAGE_SIZE);
    let transactions = state
        .ledger
        .history(&account_id, &filter.page(offset, PAGE_SIZE + 1))?;

    let has_more = transactions.len() > PAGE_SIZE;
    Ok(Json(ListTransactionsResponse {
        transactions: transactions
            .iter()
            .take(PAGE_SIZE)
            .map(TransactionResponse::from)
            .collect(),
        page: query.page,
        has_more,
    }))
}

/// Fetch the transaction recorded under a reference id.
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(reference_id): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let reference_id: ReferenceId = parse_id(&reference_id, "reference ID")?;
    let tx = state
        .ledger
        .find_by_reference(&reference_id)?
        .ok_or_else(|| ApiError::NotFound(format!("No transaction for reference {reference_id}")))?;
    Ok(Json(TransactionResponse::from(&tx)))
}
