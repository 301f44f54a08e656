//! Configuration module for settlement-service.

use dotenvy::dotenv;
use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Mongo => "mongo",
            StoreBackend::Memory => "memory",
        }
    }

    pub fn from_string(s: &str) -> Result<Self, AppError> {
        match s {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_BACKEND must be 'mongo' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub uri: Secret<String>,
    pub database: String,
}

impl DatabaseConfig {
    pub fn uri(&self) -> &str {
        self.uri.expose_secret()
    }
}

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store_backend: StoreBackend,
    pub database: DatabaseConfig,
    pub lookup_timeout: Duration,
    pub bulk_concurrency: usize,
}

impl SettlementConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let common = core_config::Config::load()?;

        let store_backend = StoreBackend::from_string(
            &env::var("STORE_BACKEND").unwrap_or_else(|_| "mongo".to_string()),
        )?;

        let uri = match env::var("MONGODB_URI") {
            Ok(uri) => uri,
            Err(_) if store_backend == StoreBackend::Memory => String::new(),
            Err(_) => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "MONGODB_URI is required when STORE_BACKEND=mongo"
                )))
            }
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "settlement-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            store_backend,
            database: DatabaseConfig {
                uri: Secret::new(uri),
                database: env::var("MONGODB_DATABASE")
                    .unwrap_or_else(|_| "settlement".to_string()),
            },
            lookup_timeout: Duration::from_millis(
                env::var("LOOKUP_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5_000),
            ),
            bulk_concurrency: env::var("BULK_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(8),
        })
    }

    /// In-memory configuration for tests and local runs.
    pub fn in_memory(port: u16) -> Self {
        Self {
            common: core_config::Config {
                port,
                ..core_config::Config::default()
            },
            service_name: "settlement-service".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            store_backend: StoreBackend::Memory,
            database: DatabaseConfig {
                uri: Secret::new(String::new()),
                database: "settlement".to_string(),
            },
            lookup_timeout: Duration::from_secs(5),
            bulk_concurrency: 8,
        }
    }
}
