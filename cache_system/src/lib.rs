//! Hash store backends for grouped caches
//!
//! This crate provides the `HashStore` trait over Redis hash commands,
//! a Redis implementation and an in-memory implementation.

/// Debug logging, compiled in only with the `debug-logging` feature
#[cfg(feature = "debug-logging")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod errors;
pub mod memory;
pub mod prelude;
pub mod redis_store;
pub mod store;

// Re-export centralized config
pub use config::RedisConfig;

pub use errors::CacheError;
pub use memory::MemoryHashStore;
pub use redis_store::RedisHashStore;
pub use store::{HashStore, KeyValue, ScanPage};
