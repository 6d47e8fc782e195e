//! Hash store abstraction
//!
//! This module defines the set of hash-map commands a grouped cache needs
//! from its backing key-value store.

use crate::errors::CacheError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Formatted entity key paired with the value stored under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One page returned by an incremental hash scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next request; `0` once the scan is complete
    pub cursor: u64,
    /// Matched `(field, value)` pairs of this page
    pub entries: Vec<(String, String)>,
}

/// Hash-map capable key-value store.
///
/// Mirrors the Redis commands of the same names. Implementations must not
/// retry; failures are reported as-is.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// `EXISTS key`
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// `HSET key field value`
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError>;

    /// `HGET key field`
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    /// `HDEL key field`, returning the number of removed fields
    async fn hdel(&self, key: &str, field: &str) -> Result<u64, CacheError>;

    /// `HEXISTS key field`
    async fn hexists(&self, key: &str, field: &str) -> Result<bool, CacheError>;

    /// `HLEN key`
    async fn hlen(&self, key: &str) -> Result<u64, CacheError>;

    /// `HVALS key`
    async fn hvals(&self, key: &str) -> Result<Vec<String>, CacheError>;

    /// `HSCAN key cursor MATCH pattern COUNT count`
    async fn hscan(
        &self,
        key: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<ScanPage, CacheError>;

    /// `EXPIRE key seconds`, returning whether a timeout was set
    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, CacheError>;

    /// Every `HSET` of `entries` followed by `EXPIRE key seconds`, as one atomic transaction
    async fn hset_many_with_expire(
        &self,
        key: &str,
        entries: &[KeyValue],
        seconds: u64,
    ) -> Result<(), CacheError>;
}

/// Convert a TTL to the signed seconds Redis expects
pub(crate) fn ttl_seconds(seconds: u64) -> Result<i64, CacheError> {
    i64::try_from(seconds).map_err(|_| CacheError::InvalidTtl(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_bounds() {
        assert_eq!(ttl_seconds(3600).unwrap(), 3600);
        assert!(matches!(
            ttl_seconds(u64::MAX),
            Err(CacheError::InvalidTtl(u64::MAX))
        ));
    }
}
