//! Convenience re-exports for common grouphash usage
//!
//! This prelude module re-exports the most commonly used items,
//! making it easier to import everything you need with a single use statement.
//!
//! # Example
//!
//! ```rust
//! use grouphash::prelude::*;
//!
//! let params = params! { "tenant" => 1 };
//! assert_eq!(params.len(), 1);
//! ```

// Core grouphash components
pub use crate::core::{ErrorHandler, GroupedKeyCache, GroupedKeyCacheBuilder};
pub use crate::errors::{GroupCacheError, GroupCacheResult};
pub use crate::key_format::{KeyFormatter, KeyParams, WILDCARD};
pub use crate::params;

// Re-export centralized config
pub use config::{AppConfig, ConfigError, GroupCacheOptions, RedisConfig};

// Re-export store backends and the store seam
pub use cache_system::prelude::*;

// Common external dependencies
pub use async_trait;
pub use tokio;
