//! In-memory [`Queue`] used by unit tests that exercise conductor and worker
//! logic without a Redis server. Single-process only; production queues live
//! in the store.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{DequeuedItem, Queue, QueueError};

#[derive(Clone, Default)]
pub struct InMemoryQueue {
    items: Arc<Mutex<VecDeque<String>>>,
    size_limit: Option<usize>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(limit: usize) -> Self {
        Self {
            items: Arc::new(Mutex::new(VecDeque::new())),
            size_limit: Some(limit),
        }
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, item: &str) -> Result<(), QueueError> {
        let mut items = self.items.lock().await;
        if let Some(limit) = self.size_limit {
            if items.len() >= limit {
                return Err(QueueError::Full);
            }
        }
        items.push_back(item.to_string());
        Ok(())
    }

    async fn dequeue(&self, _timeout: Duration) -> Result<Option<DequeuedItem>, QueueError> {
        let mut items = self.items.lock().await;
        Ok(items.pop_front().map(|raw| {
            let parsed = serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .filter(serde_json::Value::is_object);
            DequeuedItem { raw, parsed }
        }))
    }

    async fn size(&self) -> Result<u64, QueueError> {
        Ok(self.items.lock().await.len() as u64)
    }

    async fn remaining_space(&self) -> Result<Option<u64>, QueueError> {
        match self.size_limit {
            Some(limit) => {
                let size = self.items.lock().await.len();
                Ok(Some(limit.saturating_sub(size) as u64))
            }
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<(), QueueError> {
        self.items.lock().await.clear();
        Ok(())
    }
}
