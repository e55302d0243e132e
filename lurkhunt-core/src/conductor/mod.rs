//! The scan conductor: sole orchestrator of a scan and sole writer into the
//! workbench queue.
//!
//! Rate discipline lives here and nowhere else. The workbench's capacity
//! equals the platform's join allowance per window; the conductor refills it
//! at most once per window; workers can only join what the workbench holds.
//! Put together, joins across any window cannot exceed the allowance no
//! matter how many workers run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::cache::SightingsCache;
use crate::models::{FetchStatus, Scan, StopReason};
use crate::queue::{Queue, QueueError};
use crate::repository::{FetchRepository, ScanRepository};
use crate::Result;

/// How often the loop wakes to check the gate, the monitor, and the cancel
/// flag. Much smaller than the refill window.
const TICK: Duration = Duration::from_secs(1);

/// Short park when draining the pending queue; the conductor never waits
/// long on an empty backlog.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Where stream enumeration stands, published by the enumerator task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationStatus {
    Running,
    Complete,
    Failed,
}

/// Monotonic once-per-window gate for the refill loop.
///
/// Instant arithmetic, not wall-clock: a clock step cannot shrink the
/// window between two refills.
pub(crate) struct RefillGate {
    window: Duration,
    last: Option<Instant>,
}

impl RefillGate {
    pub(crate) fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// True when a full window has passed since the last allowed refill.
    /// Passing consumes the window whether or not anything gets moved.
    pub(crate) fn try_pass(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now < last + self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Move up to `min(free, backlog)` items from pending to the workbench,
/// preserving FIFO order. Returns how many moved.
///
/// Only the conductor calls this, so the workbench's remaining space cannot
/// shrink under us from another enqueuer; `QueueError::Full` is still
/// handled by pushing the item back rather than dropping it.
pub(crate) async fn transfer_batch(
    pending: &dyn Queue,
    workbench: &dyn Queue,
) -> std::result::Result<usize, QueueError> {
    let free = workbench.remaining_space().await?.unwrap_or(u64::MAX);
    let backlog = pending.size().await?;
    let to_move = free.min(backlog);

    let mut moved = 0usize;
    for _ in 0..to_move {
        let Some(item) = pending.dequeue(DRAIN_TIMEOUT).await? else {
            break;
        };
        match workbench.enqueue(&item.raw).await {
            Ok(()) => moved += 1,
            Err(QueueError::Full) => {
                tracing::warn!("Workbench filled up mid-transfer; returning item to backlog");
                pending.enqueue(&item.raw).await?;
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(moved)
}

pub struct ScanConductor {
    scans: ScanRepository,
    fetches: FetchRepository,
    pending: Arc<dyn Queue>,
    workbench: Arc<dyn Queue>,
    cache: SightingsCache,
    refill_window: Duration,
    cancel: watch::Receiver<bool>,
}

impl ScanConductor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scans: ScanRepository,
        fetches: FetchRepository,
        pending: Arc<dyn Queue>,
        workbench: Arc<dyn Queue>,
        cache: SightingsCache,
        refill_window: Duration,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            scans,
            fetches,
            pending,
            workbench,
            cache,
            refill_window,
            cancel,
        }
    }

    /// Open a scan: create its row and start from clean queues and a clean
    /// sightings cache. Leftovers from an aborted earlier scan must not
    /// bleed into this one.
    pub async fn begin(&self) -> Result<Scan> {
        let scan = Scan::new();
        let scan = self.scans.create(&scan).await?;

        self.pending.clear().await?;
        self.workbench.clear().await?;
        self.cache.clear().await?;

        tracing::info!(scan_id = %scan.scan_id, "Scan opened");
        Ok(scan)
    }

    /// Drive the scan to a terminal state: refill on cadence, watch for
    /// completion, honor operator cancel. Returns the stop reason written
    /// to the scan row.
    pub async fn run(
        &mut self,
        scan_id: Uuid,
        mut enumeration: watch::Receiver<EnumerationStatus>,
    ) -> Result<StopReason> {
        let mut gate = RefillGate::new(self.refill_window);

        loop {
            if *self.cancel.borrow() {
                return self.cancel_scan(scan_id).await;
            }

            if gate.try_pass(Instant::now()) {
                let pending = &self.pending;
                let workbench = &self.workbench;
                let transfer = || async { transfer_batch(pending.as_ref(), workbench.as_ref()).await };
                match transfer
                    .retry(
                        ExponentialBuilder::default()
                            .with_min_delay(Duration::from_millis(250))
                            .with_max_times(3),
                    )
                    .await
                {
                    Ok(moved) if moved > 0 => {
                        tracing::debug!(scan_id = %scan_id, moved, "Workbench refilled");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(scan_id = %scan_id, "Queue failure in refill loop: {e}");
                        self.finalize(scan_id, StopReason::Errored).await?;
                        return Ok(StopReason::Errored);
                    }
                }
            }

            match *enumeration.borrow_and_update() {
                EnumerationStatus::Failed => {
                    tracing::error!(scan_id = %scan_id, "Stream enumeration failed");
                    self.finalize(scan_id, StopReason::Errored).await?;
                    return Ok(StopReason::Errored);
                }
                EnumerationStatus::Complete => {
                    if self.all_work_drained(scan_id).await? {
                        self.finalize(scan_id, StopReason::Complete).await?;
                        return Ok(StopReason::Complete);
                    }
                }
                EnumerationStatus::Running => {}
            }

            tokio::time::sleep(TICK).await;
        }
    }

    /// Scan is done when both queues are dry and every fetch has reached a
    /// terminal status.
    async fn all_work_drained(&self, scan_id: Uuid) -> Result<bool> {
        if !self.pending.empty().await? {
            return Ok(false);
        }
        if !self.workbench.empty().await? {
            return Ok(false);
        }
        Ok(self.fetches.count_nonterminal_by_scan(scan_id).await? == 0)
    }

    /// Operator cancel: stop feeding, drop what was queued but not yet
    /// picked up, then wait out the in-flight fetches. Their listeners
    /// finish within their own per-channel timeouts.
    async fn cancel_scan(&self, scan_id: Uuid) -> Result<StopReason> {
        tracing::info!(scan_id = %scan_id, "Cancel requested; clearing workbench");
        self.workbench.clear().await?;

        while self.fetches.count_nonterminal_by_scan(scan_id).await? > 0 {
            tokio::time::sleep(TICK).await;
        }

        self.finalize(scan_id, StopReason::Cancelled).await?;
        Ok(StopReason::Cancelled)
    }

    /// Stamp the terminal row: end time plus the completion and error
    /// tallies. Completed fetches survive whatever stopped the scan.
    async fn finalize(&self, scan_id: Uuid, reason: StopReason) -> Result<()> {
        let fetched = self
            .fetches
            .count_by_status(scan_id, FetchStatus::Complete)
            .await?;
        let errored = self
            .fetches
            .count_by_status(scan_id, FetchStatus::Errored)
            .await?;

        self.scans
            .finalize(scan_id, reason, Utc::now(), fetched, errored)
            .await?;
        tracing::info!(
            scan_id = %scan_id,
            reason = reason.as_str(),
            fetched,
            errored,
            "Scan finalized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::memory::InMemoryQueue;

    #[test]
    fn test_refill_gate_enforces_window() {
        let mut gate = RefillGate::new(Duration::from_secs(10));
        let base = Instant::now();

        assert!(gate.try_pass(base));
        assert!(!gate.try_pass(base + Duration::from_secs(5)));
        assert!(!gate.try_pass(base + Duration::from_secs(9)));
        assert!(gate.try_pass(base + Duration::from_secs(10)));
        assert!(!gate.try_pass(base + Duration::from_secs(19)));
        assert!(gate.try_pass(base + Duration::from_secs(20)));
    }

    #[tokio::test]
    async fn test_transfer_respects_capacity_and_fifo() {
        let pending = InMemoryQueue::new();
        let workbench = InMemoryQueue::bounded(20);

        for i in 0..50 {
            pending.enqueue(&format!("stream{i}")).await.expect("enqueue");
        }

        let moved = transfer_batch(&pending, &workbench).await.expect("transfer");
        assert_eq!(moved, 20);
        assert_eq!(pending.size().await.expect("size"), 30);
        assert_eq!(workbench.remaining_space().await.expect("space"), Some(0));

        // FIFO preserved across the hop
        let first = workbench
            .dequeue(Duration::from_millis(10))
            .await
            .expect("dequeue")
            .expect("item");
        assert_eq!(first.raw, "stream0");
    }

    #[tokio::test]
    async fn test_transfer_moves_only_backlog_when_smaller() {
        let pending = InMemoryQueue::new();
        let workbench = InMemoryQueue::bounded(20);

        for i in 0..3 {
            pending.enqueue(&format!("stream{i}")).await.expect("enqueue");
        }

        let moved = transfer_batch(&pending, &workbench).await.expect("transfer");
        assert_eq!(moved, 3);
        assert!(pending.empty().await.expect("empty"));
    }

    #[tokio::test]
    async fn test_join_budget_over_five_windows() {
        // 200 backlogged streams, capacity 20, five allowed refills: no more
        // than 100 items can ever have reached the workbench, regardless of
        // how fast workers drain it.
        let pending = InMemoryQueue::new();
        let workbench = InMemoryQueue::bounded(20);
        for i in 0..200 {
            pending.enqueue(&format!("stream{i}")).await.expect("enqueue");
        }

        let mut gate = RefillGate::new(Duration::from_secs(10));
        let base = Instant::now();
        let mut total_moved = 0usize;

        for tick_seconds in 0..50u64 {
            let now = base + Duration::from_secs(tick_seconds);
            if gate.try_pass(now) {
                total_moved += transfer_batch(&pending, &workbench)
                    .await
                    .expect("transfer");
                // Workers drain the whole workbench between windows; the
                // gate, not the drain rate, must bound the flow.
                workbench.clear().await.expect("clear");
            }
        }

        // Windows open at t=0,10,20,30,40: five refills across 50 seconds,
        // so at most 100 joins were ever possible.
        assert_eq!(total_moved, 5 * 20);
    }

    #[tokio::test]
    async fn test_transfer_is_a_noop_when_workbench_is_full() {
        let pending = InMemoryQueue::new();
        // Zero remaining space: nothing should move and nothing is lost.
        let workbench = InMemoryQueue::bounded(2);
        workbench.enqueue("held1").await.expect("enqueue");
        workbench.enqueue("held2").await.expect("enqueue");
        pending.enqueue("newcomer").await.expect("enqueue");

        let moved = transfer_batch(&pending, &workbench).await.expect("transfer");
        assert_eq!(moved, 0);
        assert_eq!(pending.size().await.expect("size"), 1);
    }
}
