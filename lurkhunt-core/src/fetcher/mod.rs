//! The viewer-list fetcher worker, a.k.a. the line cook.
//!
//! One process per worker. Each worker owns exactly one channel listener and
//! pulls targets off the workbench queue, which the conductor keeps inside
//! the platform's join allowance. The worker itself never enqueues to the
//! workbench.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::watch;

use crate::cache::SightingsCache;
use crate::irc::ChannelListener;
use crate::models::{Fetch, FetchStatus, StreamTarget, UserProfile, ViewerSighting};
use crate::queue::Queue;
use crate::repository::{
    CategoryRepository, FetchRepository, SightingRepository, UserProfileRepository,
};
use crate::validation::is_valid_login_name;
use crate::{Error, Result};

/// Consecutive queue failures tolerated before the worker gives up.
const MAX_QUEUE_FAILURES: u32 = 3;

/// Pause between polls when the workbench is empty.
const IDLE_TICK: Duration = Duration::from_secs(1);

/// Repositories and cache handles a worker writes through.
#[derive(Clone)]
pub struct WorkerStores {
    pub fetches: FetchRepository,
    pub sightings: SightingRepository,
    pub profiles: UserProfileRepository,
    pub categories: CategoryRepository,
    pub cache: SightingsCache,
}

pub struct ViewerListFetcher {
    worker_id: String,
    workbench: Arc<dyn Queue>,
    listener: ChannelListener,
    stores: WorkerStores,
    dequeue_timeout: Duration,
    write_retry_attempts: usize,
    shutdown: watch::Receiver<bool>,
}

impl ViewerListFetcher {
    pub fn new(
        worker_id: impl Into<String>,
        workbench: Arc<dyn Queue>,
        listener: ChannelListener,
        stores: WorkerStores,
        dequeue_timeout: Duration,
        write_retry_attempts: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            workbench,
            listener,
            stores,
            dequeue_timeout,
            write_retry_attempts,
            shutdown,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_times(self.write_retry_attempts)
    }

    /// Dequeue-and-fetch until shutdown is requested or the queue is
    /// persistently unreachable.
    pub async fn processing_loop(&mut self) -> Result<()> {
        let mut queue_failures: u32 = 0;

        loop {
            if *self.shutdown.borrow() {
                tracing::info!(worker_id = %self.worker_id, "Shutdown requested; worker exiting");
                return Ok(());
            }

            let item = match self.workbench.dequeue(self.dequeue_timeout).await {
                Ok(item) => {
                    queue_failures = 0;
                    item
                }
                Err(e) => {
                    queue_failures += 1;
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        failures = queue_failures,
                        "Workbench dequeue failed: {e}"
                    );
                    if queue_failures >= MAX_QUEUE_FAILURES {
                        tracing::error!(
                            worker_id = %self.worker_id,
                            "Workbench unreachable; worker exiting"
                        );
                        return Err(e.into());
                    }
                    tokio::time::sleep(IDLE_TICK).await;
                    continue;
                }
            };

            let Some(item) = item else {
                tokio::time::sleep(IDLE_TICK).await;
                continue;
            };

            let target: StreamTarget = match serde_json::from_str(&item.raw) {
                Ok(target) => target,
                Err(e) => {
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        "Dropping malformed workbench item: {e}"
                    );
                    continue;
                }
            };

            let channel = target.channel_name();
            tracing::debug!(worker_id = %self.worker_id, channel, "Picked up target");
            if let Err(e) = self.process_target(&target).await {
                tracing::error!(
                    worker_id = %self.worker_id,
                    channel,
                    "Fetch failed: {e}"
                );
            }
        }
    }

    /// The full life of one fetch: row creation, profile and category
    /// upserts, the chat fetch itself, then sightings and completion.
    async fn process_target(&self, target: &StreamTarget) -> Result<()> {
        let channel = target.channel_name();

        let fetch = Fetch::from_stream(target.scan_id, &target.stream, FetchStatus::InQueue);
        let fetch = (|| async { self.stores.fetches.create(&fetch).await })
            .retry(self.backoff())
            .await?;

        let outcome = self.fetch_and_record(target, &fetch, &channel).await;
        if let Err(e) = outcome {
            // The errored mark must land: the conductor's drain and cancel
            // paths wait on every fetch reaching a terminal status.
            if let Err(mark_err) = (|| async { self.stores.fetches.mark_errored(fetch.fetch_id).await })
                .retry(self.backoff())
                .await
            {
                tracing::error!(
                    worker_id = %self.worker_id,
                    fetch_id = %fetch.fetch_id,
                    "Failed to mark fetch errored; row left non-terminal: {mark_err}"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    async fn fetch_and_record(
        &self,
        target: &StreamTarget,
        fetch: &Fetch,
        channel: &str,
    ) -> Result<()> {
        (|| async {
            self.stores
                .fetches
                .advance_status(
                    fetch.fetch_id,
                    FetchStatus::InQueue,
                    FetchStatus::WaitingOnViewerList,
                )
                .await
        })
        .retry(self.backoff())
        .await?;

        // Partial profile for the channel owner on first sighting; the
        // enricher fills the rest in later.
        let owner_id = target.stream.user_id_i64();
        if !self.stores.profiles.exists(owner_id).await? {
            let profile = UserProfile::partial(owner_id, channel);
            (|| async { self.stores.profiles.upsert_partial(&profile).await })
                .retry(self.backoff())
                .await?;
        }

        let category = target.stream.category();
        (|| async { self.stores.categories.upsert(&category).await })
            .retry(self.backoff())
            .await?;

        let batch = vec![channel.to_string()];
        let (mut results, _total) = self
            .listener
            .fetch_for_channels(&batch)
            .await
            .map_err(Error::from)?;

        let data = results
            .remove(channel)
            .ok_or_else(|| Error::Internal(format!("No listener result for '{channel}'")))?;

        if let Some(e) = data.error {
            return Err(e.into());
        }

        // Soft rate-limiting mangles 353 payloads into garbage tokens;
        // anything that is not a legal login never reaches the tables.
        let mut skipped = 0usize;
        let sightings: Vec<ViewerSighting> = data
            .names
            .iter()
            .filter(|name| {
                let valid = is_valid_login_name(name);
                if !valid {
                    skipped += 1;
                }
                valid
            })
            .map(|name| ViewerSighting::new(fetch.fetch_id, name.clone()))
            .collect();
        if skipped > 0 {
            tracing::warn!(channel, skipped, "Discarded invalid viewer names");
        }

        (|| async { self.stores.sightings.create_batch(&sightings).await })
            .retry(self.backoff())
            .await?;

        for sighting in &sightings {
            let login = sighting.viewer_login_name.clone();
            (|| async {
                self.stores
                    .cache
                    .increment_times_seen(&login)
                    .await
                    .map(|_| ())
            })
            .retry(self.backoff())
            .await?;
        }

        let duration = data.duration.map_or(0.0, |d| d.as_secs_f64());
        (|| async { self.stores.fetches.complete(fetch.fetch_id, duration).await })
            .retry(self.backoff())
            .await?;

        tracing::info!(
            worker_id = %self.worker_id,
            channel,
            viewers = sightings.len(),
            "Viewer list recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    #[tokio::test]
    #[ignore = "Requires database and Redis"]
    async fn test_single_target_end_to_end() {
        // With a seeded workbench item for "coolstreamer" and a scripted
        // listener serving alice+bob, the worker writes two sighting rows,
        // the cache counts each login once, and the fetch lands complete.
    }
}
