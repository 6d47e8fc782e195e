//! Redis hash store implementation
//!
//! This module provides the RedisHashStore struct
//! for Redis hash commands and connection management.

use crate::errors::CacheError;
use crate::store::{HashStore, KeyValue, ScanPage, ttl_seconds};
use async_trait::async_trait;
use config::RedisConfig;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Lazily-filled slot holding one shared connection
///
/// A connection that reports a connection fault is dropped so the next
/// command dials a fresh one.
pub(crate) struct ConnectionSlot<C> {
    connection: RwLock<Option<C>>,
}

impl<C: Clone> ConnectionSlot<C> {
    pub(crate) fn new() -> Self {
        Self {
            connection: RwLock::new(None),
        }
    }

    /// Return the cached connection, opening one with `connect` if the slot is empty
    pub(crate) async fn get_or_connect<F, Fut>(&self, connect: F) -> Result<C, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C, CacheError>>,
    {
        let mut slot = self.connection.write().await;

        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }

        let connection = connect().await?;
        *slot = Some(connection.clone());
        Ok(connection)
    }

    /// Pass `result` through, emptying the slot when it failed on the connection itself
    pub(crate) async fn discard_on_fault<T>(
        &self,
        result: Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        if let Err(err) = &result {
            if err.is_connection_fault() {
                let mut slot = self.connection.write().await;
                if slot.take().is_some() {
                    tracing::warn!("Dropping Redis connection after fault: {}", err);
                }
            }
        }
        result
    }

    fn status(&self) -> &'static str {
        match self.connection.try_read() {
            Ok(slot) if slot.is_some() => "connected",
            Ok(_) => "no_connection",
            Err(_) => "lock_error",
        }
    }
}

/// Redis-backed hash store sharing one multiplexed connection
#[derive(Clone)]
pub struct RedisHashStore {
    client: Arc<Client>,
    config: Arc<RedisConfig>,
    connection_pool: Arc<ConnectionSlot<MultiplexedConnection>>,
}

impl Debug for RedisHashStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisHashStore")
            .field("config", &self.config)
            .field("connected", &self.connection_pool.status())
            .finish()
    }
}

impl RedisHashStore {
    /// Create a new store; no connection is opened until the first command
    pub fn new(config: RedisConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.redis_url.as_str())?;

        Ok(Self {
            client: Arc::new(client),
            config: Arc::new(config),
            connection_pool: Arc::new(ConnectionSlot::new()),
        })
    }

    /// Create a new store from a Redis URL with default connection settings
    pub fn from_url(redis_url: &str) -> Result<Self, CacheError> {
        Self::new(RedisConfig {
            redis_url: redis_url.to_string(),
            ..RedisConfig::default()
        })
    }

    /// Get or create Redis connection
    async fn get_connection(&self) -> Result<MultiplexedConnection, CacheError> {
        self.connection_pool
            .get_or_connect(|| async {
                let timeout = Duration::from_millis(self.config.connection_timeout_ms);
                let connection =
                    tokio::time::timeout(timeout, self.client.get_multiplexed_async_connection())
                        .await
                        .map_err(|_| {
                            CacheError::Connection(format!(
                                "timed out after {}ms connecting to Redis",
                                self.config.connection_timeout_ms
                            ))
                        })??;
                debug_log!("Opened Redis connection to {}", self.config.redis_url);
                Ok::<_, CacheError>(connection)
            })
            .await
    }

    /// Convert a command reply, forgetting the connection if it broke
    async fn checked<T>(&self, reply: RedisResult<T>) -> Result<T, CacheError> {
        self.connection_pool
            .discard_on_fault(reply.map_err(CacheError::from))
            .await
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<String, CacheError> {
        let mut conn = self.get_connection().await?;

        let reply: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        self.checked(reply).await
    }

    /// Get current configuration
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

#[async_trait]
impl HashStore for RedisHashStore {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.get_connection().await?;

        let reply: RedisResult<bool> = conn.exists(key).await;
        self.checked(reply).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.get_connection().await?;

        let reply: RedisResult<()> = conn.hset(key, field, value).await;
        self.checked(reply).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.get_connection().await?;

        let reply: RedisResult<Option<String>> = conn.hget(key, field).await;
        self.checked(reply).await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<u64, CacheError> {
        let mut conn = self.get_connection().await?;

        let reply: RedisResult<u64> = conn.hdel(key, field).await;
        self.checked(reply).await
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        let mut conn = self.get_connection().await?;

        let reply: RedisResult<bool> = conn.hexists(key, field).await;
        self.checked(reply).await
    }

    async fn hlen(&self, key: &str) -> Result<u64, CacheError> {
        let mut conn = self.get_connection().await?;

        let reply: RedisResult<u64> = conn.hlen(key).await;
        self.checked(reply).await
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.get_connection().await?;

        let reply: RedisResult<Vec<String>> = conn.hvals(key).await;
        self.checked(reply).await
    }

    async fn hscan(
        &self,
        key: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<ScanPage, CacheError> {
        let mut conn = self.get_connection().await?;

        // Reply is [cursor, [field, value, field, value, ...]]
        let reply: RedisResult<(u64, Vec<String>)> = redis::cmd("HSCAN")
            .arg(key)
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await;
        let (next, flat) = self.checked(reply).await?;

        if flat.len() % 2 != 0 {
            return Err(CacheError::General(format!(
                "HSCAN returned an odd number of elements ({})",
                flat.len()
            )));
        }

        let mut entries = Vec::with_capacity(flat.len() / 2);
        let mut items = flat.into_iter();
        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            entries.push((field, value));
        }

        trace_log!(
            "HSCAN {} cursor {} -> {} ({} entries)",
            key,
            cursor,
            next,
            entries.len()
        );

        Ok(ScanPage {
            cursor: next,
            entries,
        })
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, CacheError> {
        let seconds = ttl_seconds(seconds)?;
        let mut conn = self.get_connection().await?;

        let reply: RedisResult<bool> = conn.expire(key, seconds).await;
        self.checked(reply).await
    }

    async fn hset_many_with_expire(
        &self,
        key: &str,
        entries: &[KeyValue],
        seconds: u64,
    ) -> Result<(), CacheError> {
        let seconds = ttl_seconds(seconds)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for entry in entries {
            pipe.hset(key, &entry.key, &entry.value).ignore();
        }
        pipe.expire(key, seconds).ignore();

        let mut conn = self.get_connection().await?;
        let reply: RedisResult<()> = pipe.query_async(&mut conn).await;
        self.checked(reply).await?;

        debug_log!("MULTI/EXEC on {}: {} fields + EXPIRE {}", key, entries.len(), seconds);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_does_not_connect() {
        let store = RedisHashStore::from_url("redis://127.0.0.1:6379").unwrap();

        assert_eq!(store.config().redis_url, "redis://127.0.0.1:6379");
        assert_eq!(store.config().connection_timeout_ms, 3000);
        assert!(format!("{:?}", store).contains("no_connection"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = RedisHashStore::from_url("not a redis url");
        assert!(matches!(result, Err(CacheError::Redis(_))));
    }

    async fn connect_counting(
        slot: &ConnectionSlot<usize>,
        dials: &AtomicUsize,
    ) -> Result<usize, CacheError> {
        slot.get_or_connect(|| async { Ok(dials.fetch_add(1, Ordering::SeqCst) + 1) })
            .await
    }

    #[tokio::test]
    async fn test_slot_reuses_connection() {
        let slot = ConnectionSlot::new();
        let dials = AtomicUsize::new(0);

        assert_eq!(slot.status(), "no_connection");
        assert_eq!(connect_counting(&slot, &dials).await.unwrap(), 1);
        assert_eq!(connect_counting(&slot, &dials).await.unwrap(), 1);
        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert_eq!(slot.status(), "connected");
    }

    #[tokio::test]
    async fn test_slot_redials_after_connection_fault() {
        let slot = ConnectionSlot::new();
        let dials = AtomicUsize::new(0);
        connect_counting(&slot, &dials).await.unwrap();

        let reset: redis::RedisError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        let result = slot.discard_on_fault::<()>(Err(reset.into())).await;
        assert!(matches!(result, Err(CacheError::Redis(_))));
        assert_eq!(slot.status(), "no_connection");

        assert_eq!(connect_counting(&slot, &dials).await.unwrap(), 2);
        assert_eq!(dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slot_keeps_connection_on_command_error() {
        let slot = ConnectionSlot::new();
        let dials = AtomicUsize::new(0);
        connect_counting(&slot, &dials).await.unwrap();

        let wrong_type: redis::RedisError = (redis::ErrorKind::TypeError, "WRONGTYPE").into();
        let result = slot.discard_on_fault::<()>(Err(wrong_type.into())).await;
        assert!(result.is_err());
        assert_eq!(slot.discard_on_fault(Ok(7)).await.unwrap(), 7);

        assert_eq!(connect_counting(&slot, &dials).await.unwrap(), 1);
        assert_eq!(slot.status(), "connected");
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_slot_empty() {
        let slot: ConnectionSlot<usize> = ConnectionSlot::new();
        let result = slot
            .get_or_connect(|| async { Err(CacheError::Connection("refused".into())) })
            .await;

        assert!(matches!(result, Err(CacheError::Connection(_))));
        assert_eq!(slot.status(), "no_connection");
    }
}
