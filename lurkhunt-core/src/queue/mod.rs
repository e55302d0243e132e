//! Named FIFO queues shared across processes through the backing key-value
//! store.
//!
//! Two logical queues drive a scan: *pending* (unbounded backlog written by
//! the stream enumerator) and *workbench* (bounded dispatch queue written
//! only by the conductor, sized to the platform's per-window join allowance).
//! Share [`QueueDetails`] between processes, never a live handle; each
//! process connects to the store independently and the store arbitrates.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use thiserror::Error;

#[cfg(test)]
pub mod memory;

#[derive(Error, Debug)]
pub enum QueueError {
    /// The bounded queue is at capacity; the item was not enqueued. The
    /// caller holds the item and resubmits.
    #[error("Queue is full")]
    Full,

    #[error("Queue operation failed: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Connection recipe for one logical queue. This is what gets handed to
/// other processes so they can attach to the same Redis key.
#[derive(Debug, Clone)]
pub struct QueueDetails {
    pub name: String,
    pub namespace: String,
    pub size_limit: Option<usize>,
}

impl QueueDetails {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "queue".to_string(),
            size_limit: None,
        }
    }

    #[must_use]
    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// The Redis key backing this queue.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.namespace, self.name)
    }
}

/// An item popped off a queue: the raw payload plus, when the payload was a
/// JSON object, its parsed form.
#[derive(Debug, Clone)]
pub struct DequeuedItem {
    pub raw: String,
    pub parsed: Option<serde_json::Value>,
}

impl DequeuedItem {
    fn from_raw(raw: String) -> Self {
        let parsed = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .filter(serde_json::Value::is_object);
        Self { raw, parsed }
    }
}

/// The queue operations the conductor and workers are written against.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Append an item. Fails with [`QueueError::Full`] when a configured
    /// capacity would be exceeded; the capacity check and the push are a
    /// single server-side operation, never a read-then-write.
    async fn enqueue(&self, item: &str) -> Result<(), QueueError>;

    /// Pop from the head, parking up to `timeout` when the queue is empty.
    /// Racing consumers are fine: exactly one gets each item, the rest come
    /// back with `None`.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<DequeuedItem>, QueueError>;

    async fn size(&self) -> Result<u64, QueueError>;

    /// Slots left before the capacity bound; `None` when unbounded.
    async fn remaining_space(&self) -> Result<Option<u64>, QueueError>;

    async fn empty(&self) -> Result<bool, QueueError> {
        Ok(self.size().await? == 0)
    }

    async fn clear(&self) -> Result<(), QueueError>;
}

/// A queue backed by a Redis list.
#[derive(Clone)]
pub struct RedisSharedQueue {
    conn: ConnectionManager,
    key: String,
    size_limit: Option<usize>,
}

impl RedisSharedQueue {
    /// Attach to the queue described by `details`. Call this once per
    /// process that shares the queue.
    pub async fn connect(redis_url: &str, details: &QueueDetails) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::Backend(format!("Failed to open Redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Backend(format!("Failed to connect to Redis: {e}")))?;

        Ok(Self {
            conn,
            key: details.key(),
            size_limit: details.size_limit,
        })
    }
}

#[async_trait]
impl Queue for RedisSharedQueue {
    async fn enqueue(&self, item: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();

        match self.size_limit {
            Some(limit) => {
                // Capacity check and push must be one atomic unit; a
                // read-then-write would let racing enqueuers blow past the
                // bound.
                let script = redis::Script::new(
                    r"
                    local size = redis.call('LLEN', KEYS[1])
                    if size >= tonumber(ARGV[2]) then
                        return -1
                    end
                    redis.call('RPUSH', KEYS[1], ARGV[1])
                    return size + 1
                    ",
                );

                let result: i64 = script
                    .key(&self.key)
                    .arg(item)
                    .arg(limit as i64)
                    .invoke_async(&mut conn)
                    .await?;

                if result < 0 {
                    return Err(QueueError::Full);
                }
                Ok(())
            }
            None => {
                let _: i64 = redis::cmd("RPUSH")
                    .arg(&self.key)
                    .arg(item)
                    .query_async(&mut conn)
                    .await?;
                Ok(())
            }
        }
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<DequeuedItem>, QueueError> {
        let mut conn = self.conn.clone();

        // BLPOP treats 0 as "block forever"; keep a small positive floor so
        // a zero timeout still returns promptly.
        let secs = timeout.as_secs_f64().max(0.1);
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(&self.key)
            .arg(secs)
            .query_async(&mut conn)
            .await?;

        Ok(popped.map(|(_key, value)| DequeuedItem::from_raw(value)))
    }

    async fn size(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let size: u64 = redis::cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(size)
    }

    async fn remaining_space(&self) -> Result<Option<u64>, QueueError> {
        match self.size_limit {
            Some(limit) => {
                let size = self.size().await?;
                Ok(Some((limit as u64).saturating_sub(size)))
            }
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
