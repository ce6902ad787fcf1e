//! # Engine Configuration
//!
//! Configuration for the Stockline engine: database, checkout bounds, query
//! limits and per-store profiles.
//!
//! ## Configuration Priority
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Configuration Priority (highest first)                │
//! │                                                                         │
//! │  1. Environment Variables                                              │
//! │     STOCKLINE_DB_PATH, STOCKLINE_MAX_CONNECTIONS,                      │
//! │     STOCKLINE_CHECKOUT_TIMEOUT_MS, STOCKLINE_DEFAULT_TAX_BPS,          │
//! │     STOCKLINE_MAX_PAGE_SIZE                                            │
//! │                                                                         │
//! │  2. Config File (stockline.toml)                                       │
//! │     Explicit path, or the platform config dir:                         │
//! │     ~/.config/stockline/stockline.toml (Linux)                         │
//! │     ~/Library/Application Support/com.stockline.pos/ (macOS)           │
//! │                                                                         │
//! │  3. Default Values                                                     │
//! │     Hardcoded in this module                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Config File
//! ```toml
//! [database]
//! path = "/var/lib/stockline/stockline.db"
//! max_connections = 8
//! busy_timeout_ms = 5000
//!
//! [checkout]
//! timeout_ms = 5000
//! default_tax_rate_bps = 1000
//!
//! [query]
//! default_page_size = 20
//! max_page_size = 100
//!
//! [[stores]]
//! id = "store-downtown"
//! name = "Downtown Branch"
//! address = "12 Market Street"
//! tax_rate_bps = 825
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use stockline_core::invoice::StoreProfile;
use stockline_core::validation::validate_tax_rate_bps;
use stockline_core::{TaxRate, MAX_HISTORY_LIMIT};
use stockline_db::DbConfig;

/// Config file name looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "stockline.toml";

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Database Settings
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path. `:memory:` opens a private in-memory database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long a writer waits for the SQLite write lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// How long a caller waits for a pooled connection.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "stockline", "pos")
        .map(|dirs| dirs.data_dir().join("stockline.db"))
        .unwrap_or_else(|| PathBuf::from("stockline.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

// =============================================================================
// Checkout Settings
// =============================================================================

/// `[checkout]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSettings {
    /// Upper bound for one checkout, refund or cancel.
    #[serde(default = "default_checkout_timeout_ms")]
    pub timeout_ms: u64,

    /// Tax rate for stores without their own `tax_rate_bps`.
    #[serde(default)]
    pub default_tax_rate_bps: u32,
}

fn default_checkout_timeout_ms() -> u64 {
    5_000
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            timeout_ms: default_checkout_timeout_ms(),
            default_tax_rate_bps: 0,
        }
    }
}

impl CheckoutSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// =============================================================================
// Query Settings
// =============================================================================

/// `[query]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: u32,
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

fn default_max_history_limit() -> u32 {
    MAX_HISTORY_LIMIT
}

impl Default for QuerySettings {
    fn default() -> Self {
        QuerySettings {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_history_limit: default_max_history_limit(),
        }
    }
}

// =============================================================================
// Store Settings
// =============================================================================

/// One `[[stores]]` entry: invoice header and tax rate for a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    /// Overrides `checkout.default_tax_rate_bps` for this store.
    #[serde(default)]
    pub tax_rate_bps: Option<u32>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StocklineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub checkout: CheckoutSettings,

    #[serde(default)]
    pub query: QuerySettings,

    #[serde(default)]
    pub stores: Vec<StoreSettings>,
}

impl StocklineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`path`, else `stockline.toml` in the config dir)
    /// 3. Environment variables
    ///
    /// An explicit `path` that does not exist is an error; a missing
    /// default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                Some(path) => {
                    debug!(?path, "Config file not found, using defaults");
                    Self::default()
                }
                None => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: StocklineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.path = PathBuf::from(":memory:");
        config.database.max_connections = 1;
        config
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!(?path, "Loading config from file");
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Returns the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockline", "pos")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "database.min_connections cannot exceed max_connections".into(),
            ));
        }
        if self.checkout.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "checkout.timeout_ms must be greater than 0".into(),
            ));
        }
        validate_tax_rate_bps(self.checkout.default_tax_rate_bps)
            .map_err(|e| ConfigError::Invalid(format!("checkout.{}", e)))?;

        if self.query.max_page_size == 0 {
            return Err(ConfigError::Invalid(
                "query.max_page_size must be greater than 0".into(),
            ));
        }
        if self.query.default_page_size == 0
            || self.query.default_page_size > self.query.max_page_size
        {
            return Err(ConfigError::Invalid(format!(
                "query.default_page_size must be between 1 and {}",
                self.query.max_page_size
            )));
        }
        if self.query.max_history_limit == 0 || self.query.max_history_limit > MAX_HISTORY_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "query.max_history_limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for store in &self.stores {
            if store.id.trim().is_empty() {
                return Err(ConfigError::Invalid("stores.id cannot be empty".into()));
            }
            if !seen.insert(store.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "store '{}' is configured twice",
                    store.id
                )));
            }
            if let Some(bps) = store.tax_rate_bps {
                validate_tax_rate_bps(bps)
                    .map_err(|e| ConfigError::Invalid(format!("store '{}': {}", store.id, e)))?;
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STOCKLINE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("STOCKLINE_MAX_CONNECTIONS") {
            match value.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKLINE_MAX_CONNECTIONS"),
            }
        }

        if let Ok(value) = std::env::var("STOCKLINE_CHECKOUT_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => {
                    debug!(timeout_ms = ms, "Overriding checkout timeout from environment");
                    self.checkout.timeout_ms = ms;
                }
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKLINE_CHECKOUT_TIMEOUT_MS"),
            }
        }

        if let Ok(value) = std::env::var("STOCKLINE_DEFAULT_TAX_BPS") {
            match value.parse::<u32>() {
                Ok(bps) => self.checkout.default_tax_rate_bps = bps,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKLINE_DEFAULT_TAX_BPS"),
            }
        }

        if let Ok(value) = std::env::var("STOCKLINE_MAX_PAGE_SIZE") {
            match value.parse::<u32>() {
                Ok(n) => self.query.max_page_size = n,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKLINE_MAX_PAGE_SIZE"),
            }
        }
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pool settings derived from `[database]`.
    pub fn db_config(&self) -> DbConfig {
        let base = if self.database.path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database.path)
                .max_connections(self.database.max_connections)
                .min_connections(self.database.min_connections)
        };

        base.busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .connect_timeout(Duration::from_millis(self.database.acquire_timeout_ms))
    }

    /// Store entry by id, if configured.
    pub fn store(&self, store_id: &str) -> Option<&StoreSettings> {
        self.stores.iter().find(|s| s.id == store_id)
    }

    /// Tax rate applied to sales in `store_id`.
    pub fn tax_rate_for(&self, store_id: &str) -> TaxRate {
        let bps = self
            .store(store_id)
            .and_then(|s| s.tax_rate_bps)
            .unwrap_or(self.checkout.default_tax_rate_bps);
        TaxRate::from_bps(bps)
    }

    /// Invoice header for `store_id`; unconfigured stores show their id.
    pub fn store_profile(&self, store_id: &str) -> StoreProfile {
        match self.store(store_id) {
            Some(s) => StoreProfile {
                store_id: s.id.clone(),
                name: s.name.clone(),
                address: s.address.clone(),
            },
            None => StoreProfile::fallback(store_id),
        }
    }
}
