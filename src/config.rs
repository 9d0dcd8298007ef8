//! ==============================================================================
//! config.rs - Service Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `service.toml`.
//!     loads configuration from file or falls back to defaults, then applies
//!     environment overrides. built once at startup and handed to the store,
//!     nothing reads the environment after that.
//!
//! structure:
//!     - ServerConfig: listen address.
//!     - StoreConfig: which reading store backs the api (mongo or memory).
//!     - DatabaseConfig: connection string, database/collection, deadlines.
//!     - LoggingConfig: default log filter.
//!
//! environment:
//!     AZURE_COSMOSDB_CONNECTION_STRING  -> database.connection_string
//!     SENSORS_DATABASE                  -> database.name
//!     SENSORS_COLLECTION                -> database.collection
//!     SENSORS_BIND_ADDR                 -> server.bind_addr
//!     SENSORS_STORE                     -> store.backend
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ServiceError;

pub const CONNECTION_STRING_ENV: &str = "AZURE_COSMOSDB_CONNECTION_STRING";
pub const DATABASE_ENV: &str = "SENSORS_DATABASE";
pub const COLLECTION_ENV: &str = "SENSORS_COLLECTION";
pub const BIND_ADDR_ENV: &str = "SENSORS_BIND_ADDR";
pub const STORE_ENV: &str = "SENSORS_STORE";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// file the settings were read from, `None` for built-in defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mongo,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>,
    pub name: String,
    pub collection: String,
    pub connect_timeout_seconds: u64,
    pub operation_timeout_seconds: u64,
    pub retry_writes: bool,
    pub direct_connection: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:80".to_string() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            name: "home".to_string(),
            collection: "sensors".to_string(),
            connect_timeout_seconds: 10,
            operation_timeout_seconds: 10,
            retry_writes: false,
            direct_connection: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl DatabaseConfig {
    /// The connection string, or a configuration error naming the variable to set
    pub fn connection_string(&self) -> Result<&str, ServiceError> {
        match self.connection_string.as_deref() {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(ServiceError::Configuration(format!("Must set {}", CONNECTION_STRING_ENV))),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }
}

impl ServiceConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load the first config file found (or defaults), then apply the process environment
    pub fn load_or_default() -> anyhow::Result<Self> {
        let paths = [
            PathBuf::from("config").join("service.toml"),
            PathBuf::from("..").join("config").join("service.toml"),
        ];

        let mut config = match paths.iter().find(|p| p.exists()) {
            Some(path) => {
                let mut loaded = Self::load(path)
                    .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
                loaded.source = Some(path.clone());
                loaded
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay settings from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(CONNECTION_STRING_ENV) {
            self.database.connection_string = Some(uri);
        }
        if let Some(name) = lookup(DATABASE_ENV) {
            self.database.name = name;
        }
        if let Some(collection) = lookup(COLLECTION_ENV) {
            self.database.collection = collection;
        }
        if let Some(addr) = lookup(BIND_ADDR_ENV) {
            self.server.bind_addr = addr;
        }
        if let Some(backend) = lookup(STORE_ENV) {
            self.store.backend = match backend.to_ascii_lowercase().as_str() {
                "mongo" => StoreBackend::Mongo,
                "memory" => StoreBackend::Memory,
                other => anyhow::bail!("{} must be 'mongo' or 'memory', got '{}'", STORE_ENV, other),
            };
        }
        Ok(())
    }

    /// Fail fast on settings the selected backend cannot run without
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.backend == StoreBackend::Mongo {
            self.database.connection_string()?;
            if self.database.connect_timeout_seconds == 0 {
                anyhow::bail!("database.connect_timeout_seconds must be greater than 0");
            }
            if self.database.operation_timeout_seconds == 0 {
                anyhow::bail!("database.operation_timeout_seconds must be greater than 0");
            }
        }
        Ok(())
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        match &self.source {
            Some(path) => tracing::info!("[CONFIG] Loaded from {}", path.display()),
            None => tracing::info!("[CONFIG] No config file found - using defaults"),
        }
        tracing::info!("[CONFIG] Listen: {}", self.server.bind_addr);
        tracing::info!("[CONFIG] Store: {:?}", self.store.backend);
        tracing::info!(
            "[CONFIG] Database: {}/{} (connect {}s, operation {}s)",
            self.database.name,
            self.database.collection,
            self.database.connect_timeout_seconds,
            self.database.operation_timeout_seconds
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:80");
        assert_eq!(config.store.backend, StoreBackend::Mongo);
        assert_eq!(config.database.name, "home");
        assert_eq!(config.database.collection, "sensors");
        assert_eq!(config.database.connect_timeout(), Duration::from_secs(10));
        assert!(!config.database.retry_writes);
        assert!(config.database.direct_connection);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let config = ServiceConfig::parse(
            r#"
            [database]
            collection = "readings"
            operation_timeout_seconds = 5

            [store]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.collection, "readings");
        assert_eq!(config.database.name, "home");
        assert_eq!(config.database.operation_timeout(), Duration::from_secs(5));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.server.bind_addr, "0.0.0.0:80");
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = ServiceConfig::default();
        config
            .apply_env(env(&[
                (CONNECTION_STRING_ENV, "mongodb://localhost:27017"),
                (DATABASE_ENV, "lab"),
                (COLLECTION_ENV, "probes"),
                (BIND_ADDR_ENV, "127.0.0.1:8080"),
                (STORE_ENV, "Memory"),
            ]))
            .unwrap();
        assert_eq!(config.database.connection_string().unwrap(), "mongodb://localhost:27017");
        assert_eq!(config.database.name, "lab");
        assert_eq!(config.database.collection, "probes");
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn unknown_store_backend_is_rejected() {
        let mut config = ServiceConfig::default();
        assert!(config.apply_env(env(&[(STORE_ENV, "redis")])).is_err());
    }

    #[test]
    fn zero_timeouts_fail_validation() {
        let mut config = ServiceConfig::default();
        config.database.connection_string = Some("mongodb://localhost:27017".into());
        assert!(config.validate().is_ok());

        config.database.connect_timeout_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connect_timeout_seconds"), "{err}");

        config.database.connect_timeout_seconds = 10;
        config.database.operation_timeout_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("operation_timeout_seconds"), "{err}");
    }

    #[test]
    fn missing_connection_string_fails_validation_for_mongo_only() {
        let mut config = ServiceConfig::default();
        assert!(matches!(
            config.database.connection_string(),
            Err(ServiceError::Configuration(_))
        ));
        assert!(config.validate().is_err());

        config.store.backend = StoreBackend::Memory;
        assert!(config.validate().is_ok());
    }
}
