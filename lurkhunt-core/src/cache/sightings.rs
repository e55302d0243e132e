use chrono::{DateTime, Utc};
use futures::future::join_all;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::{Error, Result};

/// Per-login record held for the duration of a scan.
///
/// `times_seen` tracks how many channels the login has been observed in so
/// far; the flags mirror whether the enricher and aggregator batch jobs have
/// processed the login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSighting {
    pub login_name: String,
    pub times_seen: u64,
    pub enriched: bool,
    pub aggregated: bool,
    pub last_seen_at: DateTime<Utc>,
}

/// Sharded `login_name -> CachedSighting` map in the backing store.
///
/// Every mutation is a server-side script, so concurrent workers can hammer
/// the same login without losing a count. Each shard holds its own
/// connection; a slow or failing shard never blocks the others.
#[derive(Clone)]
pub struct SightingsCache {
    shards: Vec<ConnectionManager>,
    key_prefix: String,
}

impl SightingsCache {
    /// Connect one handle per shard against the same Redis instance.
    pub async fn connect(redis_url: &str, num_shards: usize, key_prefix: &str) -> Result<Self> {
        if num_shards == 0 {
            return Err(Error::InvalidInput(
                "Sightings cache needs at least one shard".to_string(),
            ));
        }

        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Internal(format!("Failed to open Redis client: {e}")))?;

        let mut shards = Vec::with_capacity(num_shards);
        for _ in 0..num_shards {
            shards.push(ConnectionManager::new(client.clone()).await?);
        }

        Ok(Self {
            shards,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key(&self, login: &str) -> String {
        format!("{}viewer:{login}", self.key_prefix)
    }

    fn shard(&self, login: &str) -> ConnectionManager {
        self.shards[shard_index(login, self.shards.len())].clone()
    }

    /// Bump the counter and stamp the sighting time, creating the entry when
    /// absent. Returns the new count.
    pub async fn increment_times_seen(&self, login: &str) -> Result<u64> {
        let mut conn = self.shard(login);
        let script = redis::Script::new(
            r"
            local current = redis.call('HINCRBY', KEYS[1], 'times_seen', 1)
            redis.call('HSET', KEYS[1], 'last_seen_at', ARGV[1])
            return current
            ",
        );

        let count: u64 = script
            .key(self.key(login))
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        Ok(count)
    }

    /// Mark the login processed by the user-data enricher. Returns whether
    /// the entry existed; when it did not, nothing is written and the caller
    /// must seed the record first.
    pub async fn set_enriched(&self, login: &str, enriched: bool) -> Result<bool> {
        self.set_flag(login, "enriched", enriched).await
    }

    /// Mark the login processed by the sighting aggregator. Same existence
    /// contract as [`Self::set_enriched`].
    pub async fn set_aggregated(&self, login: &str, aggregated: bool) -> Result<bool> {
        self.set_flag(login, "aggregated", aggregated).await
    }

    async fn set_flag(&self, login: &str, field: &str, value: bool) -> Result<bool> {
        let mut conn = self.shard(login);
        let script = redis::Script::new(
            r"
            if redis.call('EXISTS', KEYS[1]) == 0 then
                return 0
            end
            redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
            return 1
            ",
        );

        let existed: i64 = script
            .key(self.key(login))
            .arg(field)
            .arg(value.to_string())
            .invoke_async(&mut conn)
            .await?;

        Ok(existed == 1)
    }

    pub async fn get(&self, login: &str) -> Result<Option<CachedSighting>> {
        let mut conn = self.shard(login);
        let data: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.key(login))
            .query_async(&mut conn)
            .await?;

        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(CachedSighting {
            login_name: login.to_string(),
            times_seen: data
                .get("times_seen")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            enriched: data.get("enriched").map(String::as_str) == Some("true"),
            aggregated: data.get("aggregated").map(String::as_str) == Some("true"),
            last_seen_at: data
                .get("last_seen_at")
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc)),
        }))
    }

    /// Write a whole record: increments `times_seen` and overwrites the
    /// flags and timestamp when the entry exists, seeds every field when it
    /// does not. Returns the resulting count.
    pub async fn upsert(&self, record: &CachedSighting) -> Result<u64> {
        let mut conn = self.shard(&record.login_name);
        let script = redis::Script::new(
            r"
            if redis.call('EXISTS', KEYS[1]) == 1 then
                redis.call('HINCRBY', KEYS[1], 'times_seen', 1)
                redis.call('HSET', KEYS[1],
                           'enriched', ARGV[2],
                           'aggregated', ARGV[3],
                           'last_seen_at', ARGV[4])
            else
                redis.call('HSET', KEYS[1],
                           'times_seen', ARGV[1],
                           'enriched', ARGV[2],
                           'aggregated', ARGV[3],
                           'last_seen_at', ARGV[4])
            end
            return redis.call('HGET', KEYS[1], 'times_seen')
            ",
        );

        let count: u64 = script
            .key(self.key(&record.login_name))
            .arg(record.times_seen)
            .arg(record.enriched.to_string())
            .arg(record.aggregated.to_string())
            .arg(record.last_seen_at.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        Ok(count)
    }

    /// Delete every key in the cache namespace, all shards in parallel.
    /// Called at scan boundaries. A failing shard is logged and skipped so
    /// the others still get cleared; the error only surfaces when every
    /// shard failed.
    pub async fn clear(&self) -> Result<u64> {
        let pattern = format!("{}viewer:*", self.key_prefix);

        let results = join_all(
            self.shards
                .iter()
                .map(|shard| clear_namespace(shard.clone(), pattern.clone())),
        )
        .await;

        let mut deleted = 0;
        let mut failures = 0;
        for result in &results {
            match result {
                Ok(count) => deleted += count,
                Err(e) => {
                    failures += 1;
                    tracing::warn!("Sightings cache shard clear failed: {e}");
                }
            }
        }

        if failures == results.len() {
            return Err(Error::Internal(
                "All sightings cache shards failed to clear".to_string(),
            ));
        }
        Ok(deleted)
    }
}

async fn clear_namespace(mut conn: ConnectionManager, pattern: String) -> Result<u64> {
    let mut deleted = 0;
    let mut cursor: u64 = 0;
    loop {
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(100)
            .query_async(&mut conn)
            .await?;

        if !keys.is_empty() {
            let removed: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
            deleted += removed;
        }

        if next == 0 {
            break;
        }
        cursor = next;
    }
    Ok(deleted)
}

/// Stable shard selection: the first eight bytes of the login's SHA-256
/// digest, mod the shard count. Every process computes the same shard for
/// the same login.
fn shard_index(login: &str, num_shards: usize) -> usize {
    let digest = Sha256::digest(login.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % num_shards as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_index_is_stable() {
        let first = shard_index("some_viewer", 4);
        let second = shard_index("some_viewer", 4);
        assert_eq!(first, second);
        assert!(first < 4);
    }

    #[test]
    fn test_shard_index_spreads_keys() {
        let mut hit = [false; 4];
        for i in 0..64 {
            hit[shard_index(&format!("viewer_{i}"), 4)] = true;
        }
        // 64 distinct logins should land on every shard
        assert!(hit.iter().all(|&h| h));
    }

    async fn test_cache() -> SightingsCache {
        let cache = SightingsCache::connect("redis://127.0.0.1:6379", 4, "test:")
            .await
            .expect("test Redis reachable");
        cache.clear().await.expect("clear");
        cache
    }

    #[tokio::test]
    #[ignore = "Requires Redis server"]
    async fn test_increment_creates_and_counts() {
        let cache = test_cache().await;

        assert_eq!(
            cache.increment_times_seen("alice").await.expect("incr"),
            1
        );
        assert_eq!(
            cache.increment_times_seen("alice").await.expect("incr"),
            2
        );

        let record = cache.get("alice").await.expect("get").expect("present");
        assert_eq!(record.times_seen, 2);
        assert!(!record.enriched);
        assert!(!record.aggregated);
    }

    #[tokio::test]
    #[ignore = "Requires Redis server"]
    async fn test_flag_setters_report_existence() {
        let cache = test_cache().await;

        // Absent key: no write, existence false
        assert!(!cache.set_enriched("ghost", true).await.expect("set"));
        assert!(cache.get("ghost").await.expect("get").is_none());

        cache.increment_times_seen("bob").await.expect("incr");
        assert!(cache.set_enriched("bob", true).await.expect("set"));
        assert!(cache.set_aggregated("bob", true).await.expect("set"));

        let record = cache.get("bob").await.expect("get").expect("present");
        assert!(record.enriched);
        assert!(record.aggregated);
        assert_eq!(record.times_seen, 1);
    }

    #[tokio::test]
    #[ignore = "Requires Redis server"]
    async fn test_upsert_then_get_round_trips() {
        let cache = test_cache().await;

        let record = CachedSighting {
            login_name: "carol".to_string(),
            times_seen: 3,
            enriched: true,
            aggregated: false,
            last_seen_at: Utc::now(),
        };

        // Fresh key: all fields seeded as given
        assert_eq!(cache.upsert(&record).await.expect("upsert"), 3);
        let got = cache.get("carol").await.expect("get").expect("present");
        assert_eq!(got.times_seen, 3);
        assert!(got.enriched);

        // Existing key: counter increments, flags overwritten
        assert_eq!(cache.upsert(&record).await.expect("upsert"), 4);
    }

    #[tokio::test]
    #[ignore = "Requires Redis server"]
    async fn test_clear_removes_namespace() {
        let cache = test_cache().await;
        cache.increment_times_seen("dave").await.expect("incr");
        cache.increment_times_seen("erin").await.expect("incr");

        let deleted = cache.clear().await.expect("clear");
        assert!(deleted >= 2);
        assert!(cache.get("dave").await.expect("get").is_none());
    }
}
