//! Practice credits HTTP API service.
//!
//! This crate exposes the credit ledger over HTTP:
//!
//! - Practice accounts and the package catalog
//! - Package purchases, balances and transaction history
//! - SMS and voice usage charging
//!
//! # Authentication
//!
//! Every `/v1` route requires the configured service key in the `x-api-key`
//! header. `/health` is public.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router even when the ledger is sync

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{default_catalog, parse_catalog, ServiceConfig, StorageBackend};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
