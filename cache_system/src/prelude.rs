//! Convenience re-exports for common cache-system usage

// Store seam and backends
pub use crate::errors::CacheError;
pub use crate::memory::MemoryHashStore;
pub use crate::redis_store::RedisHashStore;
pub use crate::store::{HashStore, KeyValue, ScanPage};

// Re-export centralized config
pub use config::RedisConfig;

// Common external dependencies
pub use async_trait::async_trait;
pub use redis;
