//! # Configuration for grouphash
//!
//! This crate provides the configuration structures shared by the grouphash
//! crates: Redis connection settings and the options that shape group and
//! entity keys.
//!
//! ## Quick Start
//!
//! ### Programmatic Configuration
//! ```rust
//! use config::{GroupCacheOptions, RedisConfig};
//!
//! let redis = RedisConfig::new("redis://localhost:6379".to_string(), 3000);
//!
//! let options = GroupCacheOptions::default()
//!     .with_ttl(60)
//!     .with_prefix("app")
//!     .with_scan_count(250);
//! assert_eq!(options.suffix, "group");
//! ```
//!
//! ### TOML File Configuration
//! ```toml
//! [redis]
//! redis_url = "redis://localhost:6379"
//! connection_timeout_ms = 3000
//!
//! [cache]
//! ttl = 3600
//! prefix = ""
//! suffix = "group"
//! entity_prefix = ""
//! entity_suffix = ""
//! scan_count = 100
//! ```
//!
//! Every key of the `[cache]` table is optional and falls back to its default.
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // Load from GROUPHASH_CONFIG or ./grouphash.toml
//! let config = AppConfig::load()?;
//!
//! // Or load from custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! # Ok::<(), config::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::{env, path::Path};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "./grouphash.toml";
const CONFIG_PATH_VAR: &str = "GROUPHASH_CONFIG";

pub const DEFAULT_TTL: u64 = 60 * 60;
pub const DEFAULT_GROUP_SUFFIX: &str = "group";
pub const DEFAULT_SCAN_COUNT: usize = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: GroupCacheOptions,
}

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub redis_url: String,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

/// Options shaping group keys, entity keys and expiry of a grouped cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupCacheOptions {
    /// Seconds a group lives after its most recent write
    pub ttl: u64,

    /// Leading segment of every group key
    pub prefix: String,

    /// Trailing segment of every group key
    pub suffix: String,

    /// Optional leading segment of entity keys, omitted when empty
    pub entity_prefix: String,

    /// Optional trailing segment of entity keys, omitted when empty
    pub entity_suffix: String,

    /// COUNT hint passed to every HSCAN page
    pub scan_count: usize,
}

fn default_connection_timeout_ms() -> u64 {
    3000
}

impl AppConfig {
    /// Load configuration from the TOML file named in `.env` / the environment, or the default path
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err.into());
            }
        }

        // GROUPHASH_CONFIG wins over the default location
        if let Ok(config_path) = env::var(CONFIG_PATH_VAR) {
            Self::from_file(&config_path)
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)
        } else {
            Err(ConfigError::Invalid(format!(
                "Config path must be specified as {} or in {} file",
                CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH
            )))
        }
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        self.redis.validate()?;
        self.cache.validate()
    }
}

impl RedisConfig {
    /// Create a new Redis configuration
    pub fn new(redis_url: String, connection_timeout_ms: u64) -> Self {
        Self {
            redis_url,
            connection_timeout_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::Invalid(
                "Redis URL cannot be empty".to_string(),
            ));
        }
        if self.connection_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "Redis connection_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

impl GroupCacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_entity_prefix(mut self, entity_prefix: impl Into<String>) -> Self {
        self.entity_prefix = entity_prefix.into();
        self
    }

    pub fn with_entity_suffix(mut self, entity_suffix: impl Into<String>) -> Self {
        self.entity_suffix = entity_suffix.into();
        self
    }

    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count;
        self
    }

    /// Validate option values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl == 0 {
            return Err(ConfigError::Invalid(
                "Cache ttl must be greater than 0".to_string(),
            ));
        }
        if self.ttl > i64::MAX as u64 {
            return Err(ConfigError::Invalid(format!(
                "Cache ttl must not exceed {}",
                i64::MAX
            )));
        }
        if self.scan_count == 0 {
            return Err(ConfigError::Invalid(
                "Cache scan_count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GroupCacheOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            prefix: String::new(),
            suffix: DEFAULT_GROUP_SUFFIX.to_string(),
            entity_prefix: String::new(),
            entity_suffix: String::new(),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}
