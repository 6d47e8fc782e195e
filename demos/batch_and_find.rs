//! # Batch Writes and Pattern Search
//!
//! This example demonstrates:
//! - Loading configuration from a TOML file
//! - Atomic batch writes with `set_many`
//! - Wildcard searches with `find` and `find_stream`
//! - JSON values
//!
//! Requires a Redis server; reads `GROUPHASH_CONFIG` or `./grouphash.toml`.

use futures::StreamExt;
use grouphash::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    sku: String,
    quantity: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let store = Arc::new(RedisHashStore::new(config.redis)?);

    let cache = GroupedKeyCache::new(store, ["shop"], ["customer", "order"], config.cache)?;
    let group = cache.format_group_key(&params! { "shop" => 1 })?;

    let batch: Vec<KeyValue> = (1..=3)
        .flat_map(|order| {
            ["ann", "ben"].map(|customer| {
                cache.format_key_value(
                    &params! { "customer" => customer, "order" => order },
                    format!("{}-{}", customer, order),
                )
            })
        })
        .collect();
    cache.set_many(&group, &batch).await?;
    println!("stored {} orders in {}", cache.size(&group).await?, group);

    let ann = params! { "customer" => "ann" };
    println!("ann's orders: {:?}", cache.find(&group, &ann).await?);

    let second_orders = params! { "order" => 2 };
    let mut stream = Box::pin(cache.find_stream(&group, &second_orders));
    while let Some(value) = stream.next().await {
        println!("order #2: {}", value?);
    }

    let order = Order {
        sku: "KB-01".to_string(),
        quantity: 2,
    };
    let key = params! { "customer" => "cat", "order" => 1 };
    cache.set_json(&group, &key, &order).await?;
    let loaded: Option<Order> = cache.get_json(&group, &key).await?;
    println!("json order: {:?}", loaded);

    Ok(())
}
