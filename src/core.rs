//! Core grouped cache functionality
//!
//! This module contains the GroupedKeyCache struct, which formats keys from
//! its schemas and forwards hash operations to the injected store, resetting
//! the group TTL after every write.

use cache_system::{CacheError, HashStore, KeyValue, ScanPage};
use config::GroupCacheOptions;
use futures::stream::{self, Stream, TryStreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;

use crate::errors::{GroupCacheError, GroupCacheResult};
use crate::key_format::{KeyFormatter, KeyParams};

/// Callback receiving connection-level store faults
pub type ErrorHandler = Arc<dyn Fn(&CacheError) + Send + Sync>;

/// Hash-backed cache whose entities live in TTL-bound groups
pub struct GroupedKeyCache<S: HashStore + ?Sized> {
    store: Arc<S>,
    keys: KeyFormatter,
    on_error: Option<ErrorHandler>,
}

impl<S: HashStore + ?Sized> Clone for GroupedKeyCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<S: HashStore + ?Sized> Debug for GroupedKeyCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupedKeyCache")
            .field("group_fields", &self.keys.group_fields())
            .field("entity_fields", &self.keys.entity_fields())
            .field("options", self.keys.options())
            .field("has_error_handler", &self.on_error.is_some())
            .finish()
    }
}

/// Builder for [`GroupedKeyCache`]
pub struct GroupedKeyCacheBuilder<S: HashStore + ?Sized> {
    store: Option<Arc<S>>,
    group_fields: Option<Vec<String>>,
    entity_fields: Option<Vec<String>>,
    options: GroupCacheOptions,
    on_error: Option<ErrorHandler>,
}

impl<S: HashStore + ?Sized> GroupedKeyCacheBuilder<S> {
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn group_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.group_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn entity_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.entity_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn options(mut self, options: GroupCacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Route connection faults to `handler` instead of logging them as fatal
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CacheError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> GroupCacheResult<GroupedKeyCache<S>> {
        let store = self.store.ok_or(GroupCacheError::MissingParameter("store"))?;
        let group_fields = self
            .group_fields
            .filter(|fields| !fields.is_empty())
            .ok_or(GroupCacheError::MissingParameter("group_fields"))?;
        let entity_fields = self
            .entity_fields
            .filter(|fields| !fields.is_empty())
            .ok_or(GroupCacheError::MissingParameter("entity_fields"))?;
        self.options.validate()?;

        Ok(GroupedKeyCache {
            store,
            keys: KeyFormatter::new(group_fields, entity_fields, self.options),
            on_error: self.on_error,
        })
    }
}

impl<S: HashStore + ?Sized> GroupedKeyCache<S> {
    /// Create a cache over `store` with the given schemas and options
    pub fn new<G, E>(
        store: Arc<S>,
        group_fields: G,
        entity_fields: E,
        options: GroupCacheOptions,
    ) -> GroupCacheResult<Self>
    where
        G: IntoIterator,
        G::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self::builder()
            .store(store)
            .group_fields(group_fields)
            .entity_fields(entity_fields)
            .options(options)
            .build()
    }

    pub fn builder() -> GroupedKeyCacheBuilder<S> {
        GroupedKeyCacheBuilder {
            store: None,
            group_fields: None,
            entity_fields: None,
            options: GroupCacheOptions::default(),
            on_error: None,
        }
    }

    /// Get the underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get current options
    pub fn options(&self) -> &GroupCacheOptions {
        self.keys.options()
    }

    pub fn key_formatter(&self) -> &KeyFormatter {
        &self.keys
    }

    // ------------------------------------------------------------------
    // Key formatting
    // ------------------------------------------------------------------

    pub fn format_group_body(&self, params: &KeyParams) -> GroupCacheResult<String> {
        self.keys.format_group_body(params)
    }

    pub fn format_group_key(&self, params: &KeyParams) -> GroupCacheResult<String> {
        self.keys.format_group_key(params)
    }

    pub fn format_entity_key(&self, params: &KeyParams) -> String {
        self.keys.format_entity_key(params)
    }

    pub fn format_key_value(&self, params: &KeyParams, value: impl Into<String>) -> KeyValue {
        self.keys.format_key_value(params, value)
    }

    // ------------------------------------------------------------------
    // Store operations
    // ------------------------------------------------------------------

    /// Check whether the group hash exists
    pub async fn group_exists(&self, group_key: &str) -> GroupCacheResult<bool> {
        self.route(self.store.exists(group_key).await)
    }

    /// Alias of [`group_exists`](Self::group_exists)
    pub async fn is_exist(&self, group_key: &str) -> GroupCacheResult<bool> {
        self.group_exists(group_key).await
    }

    /// Check whether one entity exists inside a group
    pub async fn key_exists(
        &self,
        group_key: &str,
        entity_params: &KeyParams,
    ) -> GroupCacheResult<bool> {
        let key = self.format_entity_key(entity_params);
        self.route(self.store.hexists(group_key, &key).await)
    }

    /// Write one entity, then reset the group TTL
    pub async fn set(
        &self,
        group_key: &str,
        entity_params: &KeyParams,
        value: &str,
    ) -> GroupCacheResult<()> {
        let KeyValue { key, value } = self.format_key_value(entity_params, value);
        debug_log!("HSET {} {}", group_key, key);

        self.route(self.store.hset(group_key, &key, &value).await)?;
        self.route(self.store.expire(group_key, self.options().ttl).await)?;
        Ok(())
    }

    /// Write all entities and reset the group TTL in one atomic batch
    pub async fn set_many(&self, group_key: &str, entities: &[KeyValue]) -> GroupCacheResult<()> {
        debug_log!("Batch of {} entities into {}", entities.len(), group_key);
        self.route(
            self.store
                .hset_many_with_expire(group_key, entities, self.options().ttl)
                .await,
        )
    }

    /// Number of entities in a group
    pub async fn size(&self, group_key: &str) -> GroupCacheResult<u64> {
        self.route(self.store.hlen(group_key).await)
    }

    /// All entity values of a group, in store order
    pub async fn get_all(&self, group_key: &str) -> GroupCacheResult<Vec<String>> {
        self.route(self.store.hvals(group_key).await)
    }

    /// Value of one entity
    pub async fn get(
        &self,
        group_key: &str,
        entity_params: &KeyParams,
    ) -> GroupCacheResult<Option<String>> {
        let key = self.format_entity_key(entity_params);
        self.route(self.store.hget(group_key, &key).await)
    }

    /// Values of every entity matching the (possibly partial) params.
    ///
    /// Scans from cursor `0` until the store hands back cursor `0` again.
    pub async fn find(
        &self,
        group_key: &str,
        entity_params: &KeyParams,
    ) -> GroupCacheResult<Vec<String>> {
        let pattern = self.format_entity_key(entity_params);
        let mut result = Vec::new();
        let mut cursor = 0;

        loop {
            let page = self.scan_page(group_key, cursor, &pattern).await?;
            result.extend(page.entries.into_iter().map(|(_, value)| value));
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }

        debug_log!("{} matched {} entities in {}", pattern, result.len(), group_key);
        Ok(result)
    }

    /// Lazy form of [`find`](Self::find): pages are requested as the stream is polled
    pub fn find_stream<'a>(
        &'a self,
        group_key: &'a str,
        entity_params: &'a KeyParams,
    ) -> impl Stream<Item = GroupCacheResult<String>> + 'a {
        let pattern = self.format_entity_key(entity_params);

        stream::try_unfold(Some(0u64), move |cursor| {
            let pattern = pattern.clone();
            async move {
                match cursor {
                    None => Ok(None),
                    Some(cursor) => self
                        .scan_page(group_key, cursor, &pattern)
                        .await
                        .map(|page| {
                            let next = (page.cursor != 0).then_some(page.cursor);
                            let values = page
                                .entries
                                .into_iter()
                                .map(|(_, value)| Ok::<_, GroupCacheError>(value));
                            Some((stream::iter(values), next))
                        }),
                }
            }
        })
        .try_flatten()
    }

    /// Remove one entity, returning how many fields were removed (0 or 1)
    pub async fn delete(&self, group_key: &str, entity_params: &KeyParams) -> GroupCacheResult<u64> {
        let key = self.format_entity_key(entity_params);
        self.route(self.store.hdel(group_key, &key).await)
    }

    // ------------------------------------------------------------------
    // JSON values
    // ------------------------------------------------------------------

    /// Serialize `value` as JSON and [`set`](Self::set) it
    pub async fn set_json<T>(
        &self,
        group_key: &str,
        entity_params: &KeyParams,
        value: &T,
    ) -> GroupCacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let json_str = serde_json::to_string(value)?;
        self.set(group_key, entity_params, &json_str).await
    }

    pub async fn get_json<T>(
        &self,
        group_key: &str,
        entity_params: &KeyParams,
    ) -> GroupCacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get(group_key, entity_params).await? {
            Some(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            None => Ok(None),
        }
    }

    pub async fn find_json<T>(
        &self,
        group_key: &str,
        entity_params: &KeyParams,
    ) -> GroupCacheResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.find(group_key, entity_params)
            .await?
            .iter()
            .map(|json_str| serde_json::from_str(json_str).map_err(GroupCacheError::from))
            .collect()
    }

    async fn scan_page(
        &self,
        group_key: &str,
        cursor: u64,
        pattern: &str,
    ) -> GroupCacheResult<ScanPage> {
        let page = self
            .store
            .hscan(group_key, cursor, pattern, self.options().scan_count)
            .await;
        self.route(page)
    }

    /// Hand connection faults to the error handler, or log them when none is set
    fn route<T>(&self, result: Result<T, CacheError>) -> GroupCacheResult<T> {
        result.map_err(|err| {
            if err.is_connection_fault() {
                match &self.on_error {
                    Some(handler) => handler(&err),
                    None => tracing::error!(error = %err, "store connection fault"),
                }
            }
            GroupCacheError::Store(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use cache_system::MemoryHashStore;
    use futures::StreamExt;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(options: GroupCacheOptions) -> GroupedKeyCache<MemoryHashStore> {
        GroupedKeyCache::new(
            Arc::new(MemoryHashStore::new()),
            ["tenant"],
            ["user", "order"],
            options,
        )
        .unwrap()
    }

    #[test]
    fn test_builder_requires_inputs() {
        let missing_store = GroupedKeyCache::<MemoryHashStore>::builder()
            .group_fields(["g"])
            .entity_fields(["e"])
            .build();
        assert!(matches!(
            missing_store,
            Err(GroupCacheError::MissingParameter("store"))
        ));

        let missing_group = GroupedKeyCache::builder()
            .store(Arc::new(MemoryHashStore::new()))
            .entity_fields(["e"])
            .build();
        assert!(matches!(
            missing_group,
            Err(GroupCacheError::MissingParameter("group_fields"))
        ));

        let empty_entity = GroupedKeyCache::new(
            Arc::new(MemoryHashStore::new()),
            ["g"],
            Vec::<String>::new(),
            GroupCacheOptions::default(),
        );
        assert!(matches!(
            empty_entity,
            Err(GroupCacheError::MissingParameter("entity_fields"))
        ));
    }

    #[test]
    fn test_builder_validates_options() {
        let result = GroupedKeyCache::new(
            Arc::new(MemoryHashStore::new()),
            ["g"],
            ["e"],
            GroupCacheOptions::default().with_scan_count(0),
        );
        assert!(matches!(result, Err(GroupCacheError::Config(_))));
    }

    #[test]
    fn test_debug_hides_handler() {
        let cache = GroupedKeyCache::builder()
            .store(Arc::new(MemoryHashStore::new()))
            .group_fields(["g"])
            .entity_fields(["e"])
            .on_error(|_| {})
            .build()
            .unwrap();

        let debug = format!("{:?}", cache);
        assert!(debug.contains("has_error_handler: true"));
        assert!(debug.contains("group_fields"));
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = cache(GroupCacheOptions::default());
        let group = cache.format_group_key(&params! { "tenant" => 1 }).unwrap();
        let entity = params! { "user" => "alice", "order" => 7 };

        assert!(!cache.group_exists(&group).await.unwrap());
        cache.set(&group, &entity, "pending").await.unwrap();

        assert!(cache.is_exist(&group).await.unwrap());
        assert!(cache.key_exists(&group, &entity).await.unwrap());
        assert_eq!(cache.get(&group, &entity).await.unwrap().as_deref(), Some("pending"));
        assert_eq!(cache.size(&group).await.unwrap(), 1);

        assert_eq!(cache.delete(&group, &entity).await.unwrap(), 1);
        assert_eq!(cache.delete(&group, &entity).await.unwrap(), 0);
        assert_eq!(cache.get(&group, &entity).await.unwrap(), None);
        assert!(!cache.key_exists(&group, &entity).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_resets_group_ttl() {
        let cache = cache(GroupCacheOptions::default().with_ttl(90));
        cache
            .set(":tenant:1:group", &params! { "user" => "a", "order" => 1 }, "v")
            .await
            .unwrap();

        let ttl = cache.store().ttl(":tenant:1:group").await.unwrap();
        assert!(ttl.as_secs() > 80 && ttl.as_secs() <= 90);
    }

    #[tokio::test]
    async fn test_largest_valid_ttl_does_not_panic() {
        let options = GroupCacheOptions::default().with_ttl(i64::MAX as u64);
        assert!(options.validate().is_ok());
        let cache = cache(options);

        let set = cache.set("grp", &params! { "user" => "a", "order" => 1 }, "v").await;
        assert!(matches!(
            set,
            Err(GroupCacheError::Store(CacheError::InvalidTtl(_)))
        ));

        let batch = [cache.format_key_value(&params! { "user" => "b", "order" => 1 }, "w")];
        let set_many = cache.set_many("grp", &batch).await;
        assert!(matches!(
            set_many,
            Err(GroupCacheError::Store(CacheError::InvalidTtl(_)))
        ));
        assert_eq!(cache.size("grp").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_sees_entities_when_others_are_deleted_mid_scan() {
        let cache = cache(GroupCacheOptions::default().with_scan_count(1));
        let group = ":tenant:4:group";
        for user in ["b", "c", "d"] {
            cache
                .set(group, &params! { "user" => user, "order" => 1 }, user)
                .await
                .unwrap();
        }

        let filter = KeyParams::new();
        let mut stream = Box::pin(cache.find_stream(group, &filter));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "b");

        cache
            .delete(group, &params! { "user" => "b", "order" => 1 })
            .await
            .unwrap();

        let mut rest = Vec::new();
        while let Some(value) = stream.next().await {
            rest.push(value.unwrap());
        }
        assert_eq!(rest, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_set_many_and_get_all() {
        let cache = cache(GroupCacheOptions::default());
        let group = ":tenant:1:group";
        let batch = vec![
            cache.format_key_value(&params! { "user" => "a", "order" => 1 }, "a1"),
            cache.format_key_value(&params! { "user" => "a", "order" => 2 }, "a2"),
            cache.format_key_value(&params! { "user" => "b", "order" => 1 }, "b1"),
        ];

        cache.set_many(group, &batch).await.unwrap();

        assert_eq!(cache.size(group).await.unwrap(), 3);
        let mut values = cache.get_all(group).await.unwrap();
        values.sort();
        assert_eq!(values, vec!["a1", "a2", "b1"]);
        assert!(cache.store().ttl(group).await.is_some());
    }

    #[tokio::test]
    async fn test_find_with_wildcards_across_pages() {
        let cache = cache(GroupCacheOptions::default().with_scan_count(2));
        let group = ":tenant:1:group";
        for order in 0..5 {
            cache
                .set(group, &params! { "user" => "a", "order" => order }, &format!("a{}", order))
                .await
                .unwrap();
            cache
                .set(group, &params! { "user" => "b", "order" => order }, &format!("b{}", order))
                .await
                .unwrap();
        }

        let mut found = cache.find(group, &params! { "user" => "a" }).await.unwrap();
        found.sort();
        assert_eq!(found, vec!["a0", "a1", "a2", "a3", "a4"]);

        let by_order = cache.find(group, &params! { "order" => 3 }).await.unwrap();
        assert_eq!(by_order.len(), 2);

        let everything = cache.find(group, &KeyParams::new()).await.unwrap();
        assert_eq!(everything.len(), 10);

        let none = cache.find(":tenant:404:group", &KeyParams::new()).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_find_stream_matches_find() {
        let cache = cache(GroupCacheOptions::default().with_scan_count(3));
        let group = ":tenant:2:group";
        for order in 0..7 {
            cache
                .set(group, &params! { "user" => "c", "order" => order }, &order.to_string())
                .await
                .unwrap();
        }

        let filter = params! { "user" => "c" };
        let streamed: Vec<String> = cache
            .find_stream(group, &filter)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        let eager = cache.find(group, &filter).await.unwrap();

        assert_eq!(streamed, eager);
        assert_eq!(streamed.len(), 7);

        // Restartable: a new stream scans from the beginning again
        let mut restarted = Box::pin(cache.find_stream(group, &filter));
        let first = restarted.next().await;
        assert!(matches!(first, Some(Ok(_))));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u32,
        total_cents: i64,
    }

    #[tokio::test]
    async fn test_json_values() {
        let cache = cache(GroupCacheOptions::default());
        let group = ":tenant:3:group";
        let order = Order {
            id: 1,
            total_cents: 1999,
        };

        cache
            .set_json(group, &params! { "user" => "d", "order" => 1 }, &order)
            .await
            .unwrap();
        cache
            .set(group, &params! { "user" => "e", "order" => 1 }, "not json")
            .await
            .unwrap();

        let loaded: Option<Order> = cache
            .get_json(group, &params! { "user" => "d", "order" => 1 })
            .await
            .unwrap();
        assert_eq!(loaded, Some(order));

        let missing: Option<Order> = cache
            .get_json(group, &params! { "user" => "x", "order" => 1 })
            .await
            .unwrap();
        assert_eq!(missing, None);

        let found: Vec<Order> = cache.find_json(group, &params! { "user" => "d" }).await.unwrap();
        assert_eq!(found.len(), 1);

        let broken = cache.find_json::<Order>(group, &params! { "user" => "e" }).await;
        assert!(matches!(broken, Err(GroupCacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_not_a_connection_fault() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let cache = GroupedKeyCache::builder()
            .store(Arc::new(MemoryHashStore::new()))
            .group_fields(["g"])
            .entity_fields(["e"])
            .on_error(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        cache.set("grp", &params! { "e" => 1 }, "v").await.unwrap();
        let result = cache.find("grp", &params! { "e" => "[" }).await;

        assert!(matches!(
            result,
            Err(GroupCacheError::Store(CacheError::InvalidPattern(_)))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
