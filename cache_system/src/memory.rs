//! In-memory hash store
//!
//! A process-local stand-in for Redis hashes, used by tests and by
//! embedders that do not run a Redis server. Expiry is applied lazily
//! whenever a key is touched.

use crate::errors::CacheError;
use crate::store::{HashStore, KeyValue, ScanPage};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Open scans kept before the oldest is forgotten
const MAX_OPEN_SCANS: usize = 1024;

#[derive(Debug, Default)]
struct HashEntry {
    fields: BTreeMap<String, String>,
    expires_at: Option<Instant>,
}

impl HashEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Where a paused HSCAN resumes: strictly after `last_field` of `key`
#[derive(Debug)]
struct ScanPosition {
    key: String,
    last_field: String,
}

#[derive(Debug, Default)]
struct OpenScans {
    last_cursor: u64,
    positions: BTreeMap<u64, ScanPosition>,
}

impl OpenScans {
    fn open(&mut self, position: ScanPosition) -> u64 {
        // 0 is reserved for "scan complete"
        self.last_cursor = self.last_cursor.checked_add(1).unwrap_or(1);
        self.positions.insert(self.last_cursor, position);
        if self.positions.len() > MAX_OPEN_SCANS {
            self.positions.pop_first();
        }
        self.last_cursor
    }
}

/// Hash store kept in process memory
///
/// HSCAN cursors remember the last field handed out, so fields present for
/// the whole scan are returned even when other fields are removed meanwhile.
#[derive(Debug, Clone, Default)]
pub struct MemoryHashStore {
    hashes: Arc<RwLock<HashMap<String, HashEntry>>>,
    scans: Arc<Mutex<OpenScans>>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of a key, `None` if the key is missing or has no expiry
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut hashes = self.hashes.write().await;
        let entry = live_entry(&mut hashes, key)?;
        entry
            .expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Number of live keys
    pub async fn key_count(&self) -> usize {
        let mut hashes = self.hashes.write().await;
        let now = Instant::now();
        hashes.retain(|_, entry| !entry.is_expired(now));
        hashes.len()
    }
}

/// Drop `key` if it has expired, then return it
fn live_entry<'a>(
    hashes: &'a mut HashMap<String, HashEntry>,
    key: &str,
) -> Option<&'a mut HashEntry> {
    if hashes
        .get(key)
        .is_some_and(|entry| entry.is_expired(Instant::now()))
    {
        hashes.remove(key);
    }
    hashes.get_mut(key)
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher, CacheError> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map_err(|e| CacheError::InvalidPattern(e.to_string()))?;
    Ok(glob.compile_matcher())
}

fn insert_field(hashes: &mut HashMap<String, HashEntry>, key: &str, field: &str, value: &str) {
    if live_entry(hashes, key).is_none() {
        hashes.insert(key.to_string(), HashEntry::default());
    }
    if let Some(entry) = hashes.get_mut(key) {
        entry.fields.insert(field.to_string(), value.to_string());
    }
}

fn expiry_deadline(seconds: u64) -> Result<Instant, CacheError> {
    Instant::now()
        .checked_add(Duration::from_secs(seconds))
        .ok_or(CacheError::InvalidTtl(seconds))
}

fn set_expiry(hashes: &mut HashMap<String, HashEntry>, key: &str, deadline: Instant) -> bool {
    match live_entry(hashes, key) {
        Some(entry) => {
            entry.expires_at = Some(deadline);
            true
        }
        None => false,
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut hashes = self.hashes.write().await;
        Ok(live_entry(&mut hashes, key).is_some())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        let mut hashes = self.hashes.write().await;
        insert_field(&mut hashes, key, field, value);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let mut hashes = self.hashes.write().await;
        Ok(live_entry(&mut hashes, key).and_then(|entry| entry.fields.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<u64, CacheError> {
        let mut hashes = self.hashes.write().await;
        let Some(entry) = live_entry(&mut hashes, key) else {
            return Ok(0);
        };

        let removed = entry.fields.remove(field).is_some();
        // Redis deletes a hash once its last field is gone
        if entry.fields.is_empty() {
            hashes.remove(key);
        }
        Ok(u64::from(removed))
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        let mut hashes = self.hashes.write().await;
        Ok(live_entry(&mut hashes, key).is_some_and(|entry| entry.fields.contains_key(field)))
    }

    async fn hlen(&self, key: &str) -> Result<u64, CacheError> {
        let mut hashes = self.hashes.write().await;
        Ok(live_entry(&mut hashes, key).map_or(0, |entry| entry.fields.len() as u64))
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut hashes = self.hashes.write().await;
        Ok(live_entry(&mut hashes, key)
            .map(|entry| entry.fields.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn hscan(
        &self,
        key: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<ScanPage, CacheError> {
        let matcher = compile_pattern(pattern)?;

        let resume_after = if cursor == 0 {
            None
        } else {
            let position = self
                .scans
                .lock()
                .await
                .positions
                .remove(&cursor)
                .ok_or_else(|| CacheError::General(format!("unknown scan cursor {}", cursor)))?;
            if position.key != key {
                return Err(CacheError::General(format!(
                    "scan cursor {} belongs to {}, not {}",
                    cursor, position.key, key
                )));
            }
            Some(position.last_field)
        };

        let mut hashes = self.hashes.write().await;
        let Some(entry) = live_entry(&mut hashes, key) else {
            return Ok(ScanPage::default());
        };

        let lower = match resume_after.as_deref() {
            Some(field) => Bound::Excluded(field),
            None => Bound::Unbounded,
        };
        let mut remaining = entry.fields.range::<str, _>((lower, Bound::Unbounded));

        let mut entries = Vec::new();
        let mut last_field = None;
        for (field, value) in remaining.by_ref().take(count.max(1)) {
            if matcher.is_match(field.as_str()) {
                entries.push((field.clone(), value.clone()));
            }
            last_field = Some(field.clone());
        }
        let more = remaining.next().is_some();
        drop(hashes);

        let next = match last_field {
            Some(last_field) if more => self.scans.lock().await.open(ScanPosition {
                key: key.to_string(),
                last_field,
            }),
            _ => 0,
        };

        Ok(ScanPage {
            cursor: next,
            entries,
        })
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, CacheError> {
        let deadline = expiry_deadline(seconds)?;
        let mut hashes = self.hashes.write().await;
        Ok(set_expiry(&mut hashes, key, deadline))
    }

    async fn hset_many_with_expire(
        &self,
        key: &str,
        entries: &[KeyValue],
        seconds: u64,
    ) -> Result<(), CacheError> {
        // Rejected TTLs must leave the hash untouched
        let deadline = expiry_deadline(seconds)?;

        // One write guard for the whole batch
        let mut hashes = self.hashes.write().await;
        for entry in entries {
            insert_field(&mut hashes, key, &entry.key, &entry.value);
        }
        set_expiry(&mut hashes, key, deadline);
        Ok(())
    }
}
