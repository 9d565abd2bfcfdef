//! Common test utilities for practice credits integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};

use practice_credits_core::{Package, PackageId};
use practice_credits_service::{create_router, default_catalog, AppState, ServiceConfig};
use practice_credits_store::{MemoryStore, PackageStore, Store};

/// The service key the harness configures.
pub const SERVICE_API_KEY: &str = "test-service-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, for arranging state directly.
    pub store: Arc<dyn Store>,
    /// The seeded catalog.
    pub catalog: Vec<Package>,
}

impl TestHarness {
    /// Create a harness over a fresh in-memory store with the default catalog.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Create a harness over the given store.
    pub fn with_store(store: Arc<dyn Store>) -> Self {
        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            service_api_key: Some(SERVICE_API_KEY.into()),
            ..ServiceConfig::default()
        };

        let state = AppState::new(Arc::clone(&store), config);
        let catalog = default_catalog();
        state.seed_catalog(&catalog).expect("Failed to seed catalog");

        let server = TestServer::new(create_router(state)).expect("Failed to create test server");

        Self {
            server,
            store,
            catalog,
        }
    }

    /// Catalog package by name.
    pub fn package(&self, name: &str) -> &Package {
        self.catalog
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| panic!("no package named {name}"))
    }

    /// Store an extra package.
    pub fn add_package(&self, package: &Package) {
        self.store.put_package(package).expect("Failed to store package");
    }

    /// Attach the service key.
    pub fn authed(&self, request: TestRequest) -> TestRequest {
        request
            .add_header(
                HeaderName::from_static("x-api-key"),
                HeaderValue::from_static(SERVICE_API_KEY),
            )
            .add_header(
                HeaderName::from_static("x-service-name"),
                HeaderValue::from_static("reminder-scheduler"),
            )
    }

    /// Open an account and return its id.
    pub async fn open_account(&self, name: &str) -> String {
        let response = self
            .authed(self.server.post("/v1/accounts"))
            .json(&json!({ "name": name }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        body["account_id"].as_str().expect("account_id").to_string()
    }

    /// Buy a package and return the response body.
    pub async fn purchase(&self, account_id: &str, package_id: &PackageId) -> Value {
        let response = self
            .authed(self.server.post("/v1/credits/purchase"))
            .json(&json!({
                "account_id": account_id,
                "package_id": package_id.to_string(),
                "payment_method": { "type": "credit_card", "last_four": "4242" }
            }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Open an account that has bought the named package.
    pub async fn funded_account(&self, package_name: &str) -> String {
        let account_id = self.open_account("Riverside Dental").await;
        let package_id = self.package(package_name).id;
        self.purchase(&account_id, &package_id).await;
        account_id
    }

    /// Current balance as reported by the API.
    pub async fn balance(&self, account_id: &str) -> i64 {
        let response = self
            .authed(self.server.get("/v1/credits/balance"))
            .add_query_param("account_id", account_id)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        body["balance"].as_i64().expect("balance")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
