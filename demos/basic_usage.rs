//! # Basic Usage Example
//!
//! This example demonstrates:
//! - Connecting a grouped cache to Redis
//! - Formatting group and entity keys
//! - Writing, reading and deleting entities
//!
//! Requires a Redis server on localhost:6379.

use grouphash::prelude::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("grouphash basic usage");
    println!("=====================");

    let store = Arc::new(RedisHashStore::new(RedisConfig::new(
        "redis://localhost:6379".to_string(),
        3000,
    ))?);
    println!("PING -> {}", store.ping().await?);

    let cache = GroupedKeyCache::builder()
        .store(store)
        .group_fields(["tenant", "region"])
        .entity_fields(["user"])
        .options(GroupCacheOptions::default().with_prefix("demo").with_ttl(120))
        .on_error(|err| eprintln!("redis connection problem: {}", err))
        .build()?;

    let group = cache.format_group_key(&params! { "tenant" => "acme", "region" => "eu" })?;
    println!("group key: {}", group);

    let alice = params! { "user" => "alice" };
    cache.set(&group, &alice, "alice@example.com").await?;
    cache.set(&group, &params! { "user" => "bob" }, "bob@example.com").await?;

    println!("group exists: {}", cache.group_exists(&group).await?);
    println!("entities: {}", cache.size(&group).await?);
    println!("alice: {:?}", cache.get(&group, &alice).await?);

    println!("deleted alice: {}", cache.delete(&group, &alice).await?);
    println!("deleted alice again: {}", cache.delete(&group, &alice).await?);
    println!("remaining values: {:?}", cache.get_all(&group).await?);

    Ok(())
}
