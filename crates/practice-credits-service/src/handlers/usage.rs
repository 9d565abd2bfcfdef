//! SMS and voice usage handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use practice_credits_core::{
    AccountId, CreditTransaction, ReferenceId, SmsUsage, UsageType, VoiceUsage,
};

use super::{parse_id, parse_optional_id};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// SMS send request.
#[derive(Debug, Deserialize)]
pub struct SmsRequest {
    /// Sending account.
    pub account_id: String,
    /// Message body; its length decides the segment count.
    pub message: String,
    /// Number of recipients.
    pub recipients: u64,
    /// Idempotency key.
    pub reference_id: Option<String>,
}

/// Voice call request. Exactly one of `call_minutes` and `call_seconds`.
#[derive(Debug, Deserialize)]
pub struct VoiceRequest {
    /// Calling account.
    pub account_id: String,
    /// Call length in whole minutes.
    pub call_minutes: Option<u64>,
    /// Call length in seconds, rounded up to whole minutes.
    pub call_seconds: Option<u64>,
    /// Number of recipients.
    pub recipients: u64,
    /// Idempotency key.
    pub reference_id: Option<String>,
}

/// Usage charge response.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Usage transaction ID.
    pub transaction_id: String,
    /// SMS or voice.
    pub usage_type: UsageType,
    /// Units charged.
    pub units: u64,
    /// Credits deducted.
    pub credits_charged: i64,
    /// Balance after the charge.
    pub balance: i64,
    /// Package the usage was priced under.
    pub package_id: Option<String>,
    /// Idempotency reference.
    pub reference_id: String,
}

impl UsageResponse {
    fn new(usage_type: UsageType, tx: &CreditTransaction) -> Self {
        Self {
            transaction_id: tx.id.to_string(),
            usage_type,
            units: tx.units.unwrap_or_default(),
            credits_charged: -tx.amount,
            balance: tx.balance_after,
            package_id: tx.package_id.map(|id| id.to_string()),
            reference_id: tx.reference_id.to_string(),
        }
    }
}

fn parse_ids(
    account_id: &str,
    reference_id: Option<&str>,
) -> Result<(AccountId, Option<ReferenceId>), ApiError> {
    Ok((
        parse_id(account_id, "account ID")?,
        parse_optional_id(reference_id, "reference ID")?,
    ))
}

/// Charge an SMS campaign against the account's current package.
pub async fn send_sms(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<SmsRequest>,
) -> Result<Json<UsageResponse>, ApiError> {
    let (account_id, reference_id) = parse_ids(&body.account_id, body.reference_id.as_deref())?;
    let usage = SmsUsage::for_message(&body.message, body.recipients);

    let tx = state.meter.send_sms(&account_id, usage, reference_id)?;
    tracing::info!(
        service = %auth.service_name,
        account_id = %account_id,
        segments = usage.segments(),
        recipients = usage.recipients,
        credits = -tx.amount,
        "SMS usage charged"
    );

    Ok(Json(UsageResponse::new(UsageType::Sms, &tx)))
}

/// Charge a voice campaign against the account's current package.
pub async fn place_call(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<VoiceRequest>,
) -> Result<Json<UsageResponse>, ApiError> {
    let (account_id, reference_id) = parse_ids(&body.account_id, body.reference_id.as_deref())?;
    let usage = match (body.call_minutes, body.call_seconds) {
        (Some(minutes), None) => VoiceUsage {
            call_minutes: minutes,
            recipients: body.recipients,
        },
        (None, Some(seconds)) => VoiceUsage::from_seconds(seconds, body.recipients),
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of call_minutes and call_seconds is required".into(),
            ))
        }
    };

    let tx = state.meter.place_call(&account_id, usage, reference_id)?;
    tracing::info!(
        service = %auth.service_name,
        account_id = %account_id,
        minutes = usage.call_minutes,
        recipients = usage.recipients,
        credits = -tx.amount,
        "Voice usage charged"
    );

    Ok(Json(UsageResponse::new(UsageType::Voice, &tx)))
}
