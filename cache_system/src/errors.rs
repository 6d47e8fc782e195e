//! Error types for store operations
//!
//! This module defines all error types that can occur
//! while talking to a hash-capable key-value store.

use thiserror::Error;

/// Store errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid match pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid TTL value: {0}")]
    InvalidTtl(u64),

    #[error("General cache error: {0}")]
    General(String),
}

impl CacheError {
    /// Whether this error comes from the connection itself rather than a single command
    pub fn is_connection_fault(&self) -> bool {
        match self {
            CacheError::Connection(_) => true,
            CacheError::Redis(err) => {
                err.is_io_error()
                    || err.is_connection_dropped()
                    || err.is_connection_refusal()
                    || err.is_timeout()
            }
            _ => false,
        }
    }
}
