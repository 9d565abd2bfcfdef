//! Service configuration.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use practice_credits_core::{BillingError, BillingMode, Package, PackageId, ThresholdTable};

/// Where ledger data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-process maps; lost on restart.
    Memory,
    /// `RocksDB` under `DATA_DIR`.
    RocksDb,
}

impl FromStr for StorageBackend {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" => Ok(Self::RocksDb),
            other => Err(BillingError::Configuration(format!(
                "unknown storage backend: {other}"
            ))),
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/practice-credits").
    pub data_dir: String,

    /// Service API key required on `/v1` routes.
    pub service_api_key: Option<String>,

    /// Package catalog JSON file; the built-in catalog is used when unset.
    pub catalog_path: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Storage backend (default: rocksdb when compiled in, else memory).
    pub storage_backend: StorageBackend,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Configuration` if `STORAGE_BACKEND` is not a
    /// known backend.
    pub fn from_env() -> Result<Self, BillingError> {
        let defaults = Self::default();
        let storage_backend = match std::env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.storage_backend,
        };

        Ok(Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            catalog_path: std::env::var("CATALOG_PATH").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.request_timeout_seconds),
            storage_backend,
        })
    }

    /// The package catalog to seed: the configured file, or the built-in one.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Configuration` if the file cannot be read or
    /// parsed.
    pub fn load_catalog(&self) -> Result<Vec<Package>, BillingError> {
        match &self.catalog_path {
            Some(path) => {
                let packages = load_catalog_file(Path::new(path))?;
                tracing::info!(path = %path, packages = packages.len(), "Loaded package catalog");
                Ok(packages)
            }
            None => Ok(default_catalog()),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/practice-credits".into(),
            service_api_key: None,
            catalog_path: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            storage_backend: if cfg!(feature = "rocksdb-backend") {
                StorageBackend::RocksDb
            } else {
                StorageBackend::Memory
            },
        }
    }
}

/// One package in a catalog file.
///
/// ```json
/// { "id": "…", "name": "Starter", "credit_amount": 500, "price_cents": 4999,
///   "billing": { "mode": "flat", "credit_per_sms": 2, "credit_per_voice": 5 } }
/// ```
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: PackageId,
    name: String,
    credit_amount: i64,
    price_cents: i64,
    #[serde(default = "default_active")]
    is_active: bool,
    #[serde(default)]
    description: String,
    billing: BillingMode,
}

const fn default_active() -> bool {
    true
}

impl From<CatalogEntry> for Package {
    fn from(entry: CatalogEntry) -> Self {
        let mut package = match entry.billing {
            BillingMode::Flat {
                credit_per_sms,
                credit_per_voice,
            } => Package::flat(
                entry.name,
                entry.credit_amount,
                entry.price_cents,
                credit_per_sms,
                credit_per_voice,
            ),
            BillingMode::PayAsYouGo { sms, voice } => Package::pay_as_you_go(
                entry.name,
                entry.credit_amount,
                entry.price_cents,
                sms,
                voice,
            ),
        }
        .with_description(entry.description);
        package.id = entry.id;
        package.is_active = entry.is_active;
        package
    }
}

fn load_catalog_file(path: &Path) -> Result<Vec<Package>, BillingError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        BillingError::Configuration(format!("cannot read catalog {}: {e}", path.display()))
    })?;
    parse_catalog(&contents)
}

/// Parse a catalog JSON array.
///
/// # Errors
///
/// Returns `BillingError::Configuration` for malformed JSON or invalid
/// threshold tables.
pub fn parse_catalog(json: &str) -> Result<Vec<Package>, BillingError> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(json)
        .map_err(|e| BillingError::Configuration(format!("invalid catalog: {e}")))?;
    Ok(entries.into_iter().map(Package::from).collect())
}

/// The built-in catalog. Package ids are fixed so reseeding a persistent
/// store is a no-op.
#[must_use]
pub fn default_catalog() -> Vec<Package> {
    let with_id = |mut package: Package, id: u128| {
        package.id = PackageId::from_uuid(uuid::Uuid::from_u128(id));
        package
    };

    vec![
        with_id(
            Package::flat("Starter", 500, 4_999, Some(2), Some(5))
                .with_description("Flat rate: 2 credits per SMS segment, 5 per voice minute"),
            0x5ea7_0000_0000_4000_8000_0000_0000_0001,
        ),
        with_id(
            Package::flat("Professional", 2_000, 17_999, Some(2), Some(4))
                .with_description("Flat rate: 2 credits per SMS segment, 4 per voice minute"),
            0x5ea7_0000_0000_4000_8000_0000_0000_0002,
        ),
        with_id(
            Package::flat("SMS Only", 1_000, 8_999, Some(1), None)
                .with_description("Flat rate SMS, no voice"),
            0x5ea7_0000_0000_4000_8000_0000_0000_0003,
        ),
        with_id(
            Package::pay_as_you_go(
                "Pay As You Go",
                100_000,
                79_999,
                ThresholdTable::default_sms(),
                ThresholdTable::default_voice(),
            )
            .with_description("Volume pricing: the per-unit rate drops as usage grows"),
            0x5ea7_0000_0000_4000_8000_0000_0000_0004,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_credits_core::UsageType;

    #[test]
    fn storage_backend_parses() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!(" RocksDB ".parse::<StorageBackend>().unwrap(), StorageBackend::RocksDb);
        assert!("postgres".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn default_catalog_has_stable_ids() {
        let first = default_catalog();
        let second = default_catalog();
        let ids: Vec<_> = first.iter().map(|p| p.id).collect();
        assert_eq!(ids, second.iter().map(|p| p.id).collect::<Vec<_>>());
        assert!(first.iter().any(Package::is_pay_as_you_go));
    }

    #[test]
    fn catalog_file_format() {
        let json = r#"[
            {
                "id": "5ea70000-0000-4000-8000-00000000000a",
                "name": "Clinic",
                "credit_amount": 800,
                "price_cents": 6999,
                "billing": { "mode": "flat", "credit_per_sms": 3, "credit_per_voice": null }
            },
            {
                "id": "5ea70000-0000-4000-8000-00000000000b",
                "name": "Volume",
                "credit_amount": 50000,
                "price_cents": 39999,
                "is_active": false,
                "billing": {
                    "mode": "pay_as_you_go",
                    "sms": [{ "capacity": 500, "rate": 85 }, { "capacity": null, "rate": 74 }],
                    "voice": [{ "capacity": null, "rate": 110 }]
                }
            }
        ]"#;

        let packages = parse_catalog(json).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].flat_rate(UsageType::Sms), Some(3));
        assert!(!packages[1].is_active);
        assert_eq!(
            packages[1].threshold_table(UsageType::Sms).map(ThresholdTable::len),
            Some(2)
        );
    }

    #[test]
    fn catalog_rejects_bad_tables() {
        let json = r#"[{
            "id": "5ea70000-0000-4000-8000-00000000000c",
            "name": "Broken",
            "credit_amount": 1,
            "price_cents": 1,
            "billing": { "mode": "pay_as_you_go", "sms": [], "voice": [] }
        }]"#;
        assert!(matches!(
            parse_catalog(json),
            Err(BillingError::Configuration(_))
        ));
    }
}
