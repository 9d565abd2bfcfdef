//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use practice_credits_core::BillingError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid service key.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict with the current state of the account or catalog.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A package cannot price the requested usage.
    #[error("corrupted package {package_id} ({name})")]
    CorruptedPackage {
        /// The broken package.
        package_id: String,
        /// Its display name.
        name: String,
    },

    /// Insufficient credits.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        available: i64,
        /// Required amount.
        required: u64,
    },

    /// The payment processor refused the charge.
    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::CorruptedPackage { package_id, name } => (
                StatusCode::CONFLICT,
                "corrupted_package",
                format!("Package {name} has no rate for the requested usage"),
                Some(serde_json::json!({ "package_id": package_id, "name": name })),
            ),
            Self::InsufficientCredits {
                available,
                required,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": available,
                    "required": required
                })),
            ),
            Self::PaymentDeclined(reason) => (
                StatusCode::PAYMENT_REQUIRED,
                "payment_declined",
                format!("Payment declined: {reason}"),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InsufficientCredits {
                required,
                available,
            } => Self::InsufficientCredits {
                available,
                required,
            },
            BillingError::CorruptedPackage { package_id, name } => {
                Self::CorruptedPackage { package_id, name }
            }
            BillingError::PaymentDeclined { reason } => Self::PaymentDeclined(reason),
            err @ (BillingError::AccountNotFound { .. } | BillingError::PackageNotFound { .. }) => {
                Self::NotFound(err.to_string())
            }
            err @ (BillingError::AccountAlreadyExists { .. }
            | BillingError::ReferenceConflict { .. }
            | BillingError::PackageInactive { .. }
            | BillingError::NoActivePackage { .. }) => Self::Conflict(err.to_string()),
            err @ (BillingError::InvalidUsage(_)
            | BillingError::InvalidAmount(_)
            | BillingError::InvalidThresholds(_)
            | BillingError::InvalidId(_)) => Self::BadRequest(err.to_string()),
            err @ (BillingError::Storage(_)
            | BillingError::Serialization(_)
            | BillingError::Configuration(_)) => Self::Internal(err.to_string()),
        }
    }
}

impl From<practice_credits_store::StoreError> for ApiError {
    fn from(err: practice_credits_store::StoreError) -> Self {
        BillingError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: BillingError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn billing_errors_map_to_status_codes() {
        assert_eq!(
            status_of(BillingError::InsufficientCredits {
                required: 10,
                available: 5
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(BillingError::CorruptedPackage {
                package_id: "p".into(),
                name: "Broken".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BillingError::AccountNotFound {
                account_id: "a".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(BillingError::InvalidUsage("no recipients".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BillingError::Storage("disk full".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
