//! # grouphash
//!
//! Deterministic composite keys and group-level TTL expiry on top of Redis
//! hashes.
//!
//! A [`GroupedKeyCache`] is configured with two ordered field-name schemas:
//! one naming the fields that identify a *group* (a Redis hash) and one naming
//! the fields that identify an *entity* (a field inside that hash). Every
//! write resets the TTL of the whole group.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grouphash::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(RedisHashStore::from_url("redis://localhost:6379")?);
//!
//!     let cache = GroupedKeyCache::new(
//!         store,
//!         ["tenant"],
//!         ["user", "order"],
//!         GroupCacheOptions::default().with_ttl(600),
//!     )?;
//!
//!     let group = cache.format_group_key(&params! { "tenant" => 42 })?;
//!     assert_eq!(group, ":tenant:42:group");
//!
//!     cache.set(&group, &params! { "user" => "alice", "order" => 1 }, "pending").await?;
//!
//!     // Leave `order` out to match every order of alice
//!     let orders = cache.find(&group, &params! { "user" => "alice" }).await?;
//!     println!("alice has {} orders", orders.len());
//!
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Build [`KeyParams`] from `field => value` pairs
///
/// ```rust
/// let params = grouphash::params! { "user" => "alice", "order" => 7 };
/// assert_eq!(params.get("order"), Some("7"));
/// ```
#[macro_export]
macro_rules! params {
    ($($field:expr => $value:expr),* $(,)?) => {
        $crate::KeyParams::new()$(.with($field, $value))*
    };
}

pub mod core;
pub mod errors;
pub mod key_format;
pub mod prelude;

// Re-export the main public types for convenience
pub use crate::core::{ErrorHandler, GroupedKeyCache, GroupedKeyCacheBuilder};
pub use errors::{GroupCacheError, GroupCacheResult};
pub use key_format::{KeyFormatter, KeyParams, WILDCARD};

// Re-export centralized config
pub use config::{AppConfig, ConfigError, GroupCacheOptions, RedisConfig};

// Re-export internal crates used by the public API
pub use cache_system;
pub use cache_system::{CacheError, HashStore, KeyValue, MemoryHashStore, RedisHashStore, ScanPage};

// Re-export external dependencies used in public API
pub use async_trait;
