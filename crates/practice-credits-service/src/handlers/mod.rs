//! API handlers.

pub mod accounts;
pub mod credits;
pub mod health;
pub mod packages;
pub mod usage;

use std::str::FromStr;

use crate::error::ApiError;

/// Parse an identifier from a request, naming the field on failure.
pub(crate) fn parse_id<T: FromStr>(raw: &str, field: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {field}")))
}

/// Parse an optional identifier.
pub(crate) fn parse_optional_id<T: FromStr>(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<T>, ApiError> {
    raw.map(|raw| parse_id(raw, field)).transpose()
}
