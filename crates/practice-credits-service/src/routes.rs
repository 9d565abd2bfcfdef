//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, credits, health, packages, usage};
use crate::state::AppState;

/// Maximum concurrent requests for usage endpoints.
const USAGE_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts (service key)
/// - `POST /v1/accounts` - Open a practice account
/// - `GET /v1/accounts/:account_id` - Get an account
///
/// ## Catalog (service key)
/// - `GET /v1/packages` - List credit packages
///
/// ## Credits (service key)
/// - `POST /v1/credits/purchase` - Buy a package
/// - `GET /v1/credits/balance?account_id=` - Balance and usage estimates
/// - `GET /v1/credits/transactions?account_id=&page=` - Transaction history
/// - `GET /v1/credits/receipts/:reference_id` - Transaction by reference
///
/// ## Usage (service key, separately limited)
/// - `POST /v1/usage/sms` - Charge an SMS send
/// - `POST /v1/usage/voice` - Charge a voice call
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let usage_routes = Router::new()
        .route("/sms", post(usage::send_sms))
        .route("/voice", post(usage::place_call))
        .layer(ConcurrencyLimitLayer::new(USAGE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/:account_id", get(accounts::get_account))
        // Catalog
        .route("/packages", get(packages::list_packages))
        // Credits
        .route("/credits/purchase", post(credits::purchase))
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        .route("/credits/receipts/:reference_id", get(credits::get_receipt))
        .nest("/usage", usage_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}
