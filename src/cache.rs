//! Redis-backed read cache with TTL, plus the invalidation side of the
//! pipeline. The cache is a performance optimization, never the source of
//! truth: invalidation is best-effort and a stale entry survives at most
//! until its TTL.

use crate::error::{Result, SyncError};
use crate::observability;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Key/value store with TTL semantics. `delete_by_pattern` takes a glob-style
/// pattern (`game:42:*`).
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Deletes every key matching the pattern, returning how many were
    /// removed. Per-key failures are collected and reported jointly rather
    /// than aborting the scan.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64>;
}

pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn connect(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| SyncError::CacheUnavailable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SyncError::CacheUnavailable(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| SyncError::CacheUnavailable(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set_ex(key, value, ttl.as_secs())
            .await
            .map_err(|e| SyncError::CacheUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| SyncError::CacheUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        // Incremental SCAN so we never block the store the way KEYS would.
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        let mut failures: Vec<String> = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| SyncError::CacheUnavailable(e.to_string()))?;

            for key in keys {
                let res: std::result::Result<(), redis::RedisError> = conn.del(&key).await;
                match res {
                    Ok(()) => deleted += 1,
                    Err(e) => failures.push(format!("{key}: {e}")),
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        if failures.is_empty() {
            Ok(deleted)
        } else {
            Err(SyncError::CacheUnavailable(format!(
                "deleted {deleted} keys for '{pattern}', {} failed: {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}

/// Glob match supporting `*` wildcards, mirroring Redis MATCH semantics
/// closely enough for our key shapes.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let last = parts.len() - 1;
    let mut pos = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            return text.len() >= pos + part.len() && text.ends_with(part);
        } else {
            match text[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }
    true
}

/// TTL-aware in-memory store for development and tests.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, Some(expires_at))) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let mut entries = self.entries.lock().unwrap();
        let matching: Vec<String> = entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        for key in &matching {
            entries.remove(key);
        }
        Ok(matching.len() as u64)
    }
}

/// Entity kinds whose mutation the persistence facade reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatedEntity {
    Game,
    Rating,
    Company,
}

/// Deterministic set of cache keys and patterns to purge for one mutation:
/// the per-entity key plus every list/aggregate key embedding it.
pub fn invalidation_keys(entity: MutatedEntity, id: &str) -> Vec<String> {
    match entity {
        MutatedEntity::Game => vec![
            format!("game:{id}"),
            format!("game:{id}:*"),
            "games:list:*".to_string(),
            "games:trending".to_string(),
        ],
        MutatedEntity::Rating => vec![
            format!("game:{id}"),
            format!("game:{id}:rating"),
            "games:trending".to_string(),
        ],
        MutatedEntity::Company => vec![
            format!("company:{id}"),
            "companies:list:*".to_string(),
        ],
    }
}

/// Purges stale keys after canonical data changes. Failures are logged and
/// swallowed; serving correctness never depends on a purge succeeding.
pub struct CacheInvalidator {
    store: Arc<dyn CacheStore>,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn purge(&self, keys: &[String]) {
        for key in keys {
            let result = if key.contains('*') {
                self.store.delete_by_pattern(key).await
            } else {
                self.store.delete(key).await.map(|_| 1)
            };
            match result {
                Ok(count) => {
                    observability::cache::keys_purged(count);
                    debug!(key, count, "purged cache key");
                }
                Err(e) => {
                    observability::cache::purge_error();
                    warn!(key, "cache purge failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_match_covers_key_shapes() {
        assert!(glob_match("game:42:*", "game:42:rating"));
        assert!(glob_match("game:42:*", "game:42:screenshots:1"));
        assert!(!glob_match("game:42:*", "game:421:rating"));
        assert!(glob_match("games:list:*", "games:list:page:2"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(glob_match("*trending*", "games:trending:weekly"));
    }

    #[test]
    fn invalidation_keys_are_deterministic() {
        let first = invalidation_keys(MutatedEntity::Game, "42");
        let second = invalidation_keys(MutatedEntity::Game, "42");
        assert_eq!(first, second);
        assert!(first.contains(&"game:42".to_string()));
        assert!(first.contains(&"games:trending".to_string()));

        let rating = invalidation_keys(MutatedEntity::Rating, "42");
        assert!(rating.contains(&"game:42:rating".to_string()));
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = InMemoryCache::new();
        cache
            .set("game:1", "payload", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("game:1").await.unwrap(), Some("payload".into()));
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = InMemoryCache::new();
        cache
            .set("game:1", "payload", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("game:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_by_pattern_leaves_unrelated_keys_untouched() {
        let cache = Arc::new(InMemoryCache::new());
        let ttl = Duration::from_secs(60);
        cache.set("game:42:rating", "a", ttl).await.unwrap();
        cache.set("game:42:summary", "b", ttl).await.unwrap();
        cache.set("game:7:rating", "c", ttl).await.unwrap();
        cache.set("games:trending", "d", ttl).await.unwrap();

        // Concurrent writers on unrelated keys must not be disturbed.
        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    cache
                        .set(&format!("company:{i}"), "x", ttl)
                        .await
                        .unwrap();
                }
            })
        };

        let deleted = cache.delete_by_pattern("game:42:*").await.unwrap();
        writer.await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(cache.get("game:42:rating").await.unwrap(), None);
        assert_eq!(cache.get("game:42:summary").await.unwrap(), None);
        assert_eq!(cache.get("game:7:rating").await.unwrap(), Some("c".into()));
        assert_eq!(
            cache.get("games:trending").await.unwrap(),
            Some("d".into())
        );
        assert_eq!(cache.get("company:49").await.unwrap(), Some("x".into()));
    }

    #[tokio::test]
    async fn invalidator_swallows_store_errors() {
        struct FailingStore;

        #[async_trait]
        impl CacheStore for FailingStore {
            async fn get(&self, _key: &str) -> Result<Option<String>> {
                Err(SyncError::CacheUnavailable("down".into()))
            }
            async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
                Err(SyncError::CacheUnavailable("down".into()))
            }
            async fn delete(&self, _key: &str) -> Result<()> {
                Err(SyncError::CacheUnavailable("down".into()))
            }
            async fn delete_by_pattern(&self, _pattern: &str) -> Result<u64> {
                Err(SyncError::CacheUnavailable("down".into()))
            }
        }

        let invalidator = CacheInvalidator::new(Arc::new(FailingStore));
        // Must not panic or propagate.
        invalidator
            .purge(&["game:1".to_string(), "games:list:*".to_string()])
            .await;
    }
}
