//! Configuration management for Satlas services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable consulted for the catalog credential when no other source sets it
pub const CATALOG_API_KEY_ENV: &str = "PL_API_KEY";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Imagery catalog API configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Static reference data configuration
    #[serde(default)]
    pub reference: ReferenceConfig,

    /// Ingestion pipeline configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Catalog API base URL
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,

    /// Basic-auth credential (username part, empty password)
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,

    /// Attempts per request when rate limited (first try included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff delay cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Page size requested from the search endpoint (0 lets the server decide)
    #[serde(default)]
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReferenceConfig {
    /// Enable the static reference import for empty tables
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base URL of the Natural Earth GeoJSON mirror
    #[serde(default = "default_reference_base_url")]
    pub base_url: String,

    /// City buffer radius in meters
    #[serde(default = "default_city_buffer_m")]
    pub city_buffer_m: f64,

    /// Request timeout in seconds
    #[serde(default = "default_reference_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Number of features normalized and persisted concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

// Default value functions
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_catalog_base_url() -> String { "https://api.planet.com/data/v1".to_string() }
fn default_catalog_timeout() -> u64 { 60 }
fn default_max_attempts() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 200 }
fn default_max_delay_ms() -> u64 { 10_000 }
fn default_enabled() -> bool { true }
fn default_reference_base_url() -> String { "https://d2ad6b4ur7yvpq.cloudfront.net/naturalearth-3.3.0".to_string() }
fn default_city_buffer_m() -> f64 { 30_000.0 }
fn default_reference_timeout() -> u64 { 120 }
fn default_workers() -> usize { 8 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            api_key: None,
            timeout_secs: default_catalog_timeout(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            page_size: 0,
        }
    }
}

impl CatalogConfig {
    /// Request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Resolve the credential: explicit override, then config, then `PL_API_KEY`.
    /// Blank values at any level are skipped.
    pub fn resolve_api_key(&self, overridden: Option<&str>) -> Option<String> {
        let present = |key: &String| !key.trim().is_empty();
        overridden
            .map(str::to_string)
            .filter(present)
            .or_else(|| self.api_key.clone().filter(present))
            .or_else(|| std::env::var(CATALOG_API_KEY_ENV).ok().filter(present))
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: default_reference_base_url(),
            city_buffer_m: default_city_buffer_m(),
            timeout_secs: default_reference_timeout(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl IngestionConfig {
    /// Worker count clamped to a sane pool size
    pub fn effective_workers(&self) -> usize {
        self.workers.clamp(1, 64)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("database.url", "postgres://localhost/satlas")?
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__CATALOG__MAX_ATTEMPTS=7
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/satlas".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            catalog: CatalogConfig::default(),
            reference: ReferenceConfig::default(),
            ingestion: IngestionConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.catalog.max_attempts, 5);
        assert_eq!(config.reference.city_buffer_m, 30_000.0);
        assert_eq!(config.ingestion.workers, 8);
    }

    #[test]
    fn test_worker_clamp() {
        assert_eq!(IngestionConfig { workers: 0 }.effective_workers(), 1);
        assert_eq!(IngestionConfig { workers: 500 }.effective_workers(), 64);
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let config = CatalogConfig {
            api_key: Some("from-config".into()),
            ..CatalogConfig::default()
        };
        assert_eq!(config.resolve_api_key(Some("from-flag")).as_deref(), Some("from-flag"));
        assert_eq!(config.resolve_api_key(None).as_deref(), Some("from-config"));
    }

    #[test]
    fn test_blank_api_key_falls_through() {
        let config = CatalogConfig {
            api_key: Some("from-config".into()),
            ..CatalogConfig::default()
        };
        assert_eq!(config.resolve_api_key(Some("")).as_deref(), Some("from-config"));
        assert_eq!(config.resolve_api_key(Some("  ")).as_deref(), Some("from-config"));

        let blank_config = CatalogConfig {
            api_key: Some("   ".into()),
            ..CatalogConfig::default()
        };
        assert_eq!(blank_config.resolve_api_key(Some("from-flag")).as_deref(), Some("from-flag"));
        assert_ne!(blank_config.resolve_api_key(None).as_deref(), Some("   "));
    }
}
