//! Error types for the grouphash crate
//!
//! This module contains all error types that can be returned by grouped cache operations.

use cache_system::CacheError;
use config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroupCacheError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid number of parameters: expected {expected}, got {actual}")]
    InvalidParameterCount { expected: usize, actual: usize },

    #[error("Group key field not supplied: {0}")]
    MissingGroupField(String),

    #[error("Store error: {0}")]
    Store(#[from] CacheError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type GroupCacheResult<T> = Result<T, GroupCacheError>;
