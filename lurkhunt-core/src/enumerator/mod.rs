//! Stream enumeration: one task per scan that pages through the live-stream
//! listing and feeds the pending queue.
//!
//! The enumerator is the only writer into *pending*. It does not touch the
//! workbench; pacing is entirely the conductor's concern.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use uuid::Uuid;

use crate::credentials::CredentialManager;
use crate::models::StreamTarget;
use crate::queue::Queue;
use crate::twitch::{self, ApiError, StreamsQuery, TwitchStream};
use crate::{Error, Result};

/// Full pages keep the cursor walk short.
const PAGE_SIZE: u32 = 100;

/// Transient statuses worth retrying before giving up on a page.
fn is_transient(error: &Error) -> bool {
    match error {
        Error::Api(ApiError::Status { status, .. }) => *status == 429 || *status >= 500,
        Error::Api(ApiError::Network(_)) => true,
        _ => false,
    }
}

fn is_auth_rejection(error: &Error) -> bool {
    matches!(
        error,
        Error::Api(ApiError::Status { status, .. }) if *status == 401 || *status == 403
    )
}

pub struct StreamEnumerator {
    credentials: Arc<CredentialManager>,
    pending: Arc<dyn Queue>,
    filters: StreamsQuery,
}

impl StreamEnumerator {
    pub fn new(
        credentials: Arc<CredentialManager>,
        pending: Arc<dyn Queue>,
        filters: StreamsQuery,
    ) -> Self {
        Self {
            credentials,
            pending,
            filters,
        }
    }

    /// Walk the listing to exhaustion, enqueueing one envelope per stream.
    /// Returns how many streams were targeted.
    pub async fn run(&self, scan_id: Uuid) -> Result<u64> {
        let mut cursor: Option<String> = None;
        let mut targeted: u64 = 0;

        loop {
            let (streams, next_cursor) = self.fetch_page(cursor.clone()).await?;
            let page_len = streams.len();

            for stream in streams {
                self.enqueue_target(scan_id, stream).await?;
                targeted += 1;
            }
            tracing::debug!(scan_id = %scan_id, page_len, targeted, "Enumerated page");

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(scan_id = %scan_id, targeted, "Stream enumeration finished");
        Ok(targeted)
    }

    /// One page with the per-call policy applied: 429/5xx and network hiccups
    /// retry with backoff; a 401/403 gets exactly one refresh-and-retry.
    async fn fetch_page(
        &self,
        cursor: Option<String>,
    ) -> Result<(Vec<TwitchStream>, Option<String>)> {
        let query = StreamsQuery {
            first: Some(PAGE_SIZE),
            after: cursor,
            ..self.filters.clone()
        };

        let attempt = || async {
            let config = self.credentials.api_config().await?;
            twitch::get_streams(&config, &query).await.map_err(Error::from)
        };

        let result = attempt
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_times(3),
            )
            .when(is_transient)
            .await;

        match result {
            Err(e) if is_auth_rejection(&e) => {
                tracing::warn!("Listing rejected the token; refreshing once and retrying");
                self.credentials.force_refresh().await?;
                attempt().await
            }
            other => other,
        }
    }

    async fn enqueue_target(&self, scan_id: Uuid, stream: TwitchStream) -> Result<()> {
        let target = StreamTarget::new(scan_id, stream);
        let payload = serde_json::to_string(&target)?;
        self.pending.enqueue(&payload).await?;
        Ok(())
    }
}
