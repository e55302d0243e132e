use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::{
    models::{Fetch, FetchStatus},
    Error, Result,
};

/// Viewer-list fetch repository for database operations
#[derive(Clone)]
pub struct FetchRepository {
    pool: PgPool,
}

impl FetchRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new fetch row
    pub async fn create(&self, fetch: &Fetch) -> Result<Fetch> {
        let row = sqlx::query(
            r"
            INSERT INTO fetches (fetch_id, scan_id, channel_owner_id, category_id,
                                 stream_id, viewer_count, stream_started_at, language,
                                 is_mature, was_live, status, fetch_action_at, duration_seconds)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING fetch_id, scan_id, channel_owner_id, category_id, stream_id,
                      viewer_count, stream_started_at, language, is_mature, was_live,
                      status, fetch_action_at, duration_seconds
            ",
        )
        .bind(fetch.fetch_id)
        .bind(fetch.scan_id)
        .bind(fetch.channel_owner_id)
        .bind(fetch.category_id)
        .bind(fetch.stream_id)
        .bind(fetch.viewer_count)
        .bind(fetch.stream_started_at)
        .bind(&fetch.language)
        .bind(fetch.is_mature)
        .bind(fetch.was_live)
        .bind(fetch.status.as_str())
        .bind(fetch.fetch_action_at)
        .bind(fetch.duration_seconds)
        .fetch_one(&self.pool)
        .await?;

        row_to_fetch(&row)
    }

    pub async fn get(&self, fetch_id: Uuid) -> Result<Option<Fetch>> {
        let row = sqlx::query(
            r"
            SELECT fetch_id, scan_id, channel_owner_id, category_id, stream_id,
                   viewer_count, stream_started_at, language, is_mature, was_live,
                   status, fetch_action_at, duration_seconds
            FROM fetches
            WHERE fetch_id = $1
            ",
        )
        .bind(fetch_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_fetch(&row)?)),
            None => Ok(None),
        }
    }

    /// Advance a fetch one step along its lifecycle.
    ///
    /// The move is rejected client-side when it is not a legal transition,
    /// and the UPDATE is conditioned on the expected current status so a
    /// racing writer cannot skip or rewind a step. Returns whether the row
    /// actually moved.
    pub async fn advance_status(
        &self,
        fetch_id: Uuid,
        from: FetchStatus,
        to: FetchStatus,
    ) -> Result<bool> {
        if !from.can_advance_to(to) {
            return Err(Error::InvalidInput(format!(
                "Illegal fetch status transition {} -> {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let result = sqlx::query(
            r"
            UPDATE fetches SET status = $3
            WHERE fetch_id = $1 AND status = $2
            ",
        )
        .bind(fetch_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Terminal success: stamp the elapsed listener time alongside the status.
    pub async fn complete(&self, fetch_id: Uuid, duration_seconds: f64) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE fetches SET status = 'complete', duration_seconds = $2
            WHERE fetch_id = $1 AND status = 'waiting_on_viewer_list'
            ",
        )
        .bind(fetch_id)
        .bind(duration_seconds)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Terminal failure. Valid from any non-terminal status so a worker can
    /// bail out wherever the error hit.
    pub async fn mark_errored(&self, fetch_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE fetches SET status = 'errored'
            WHERE fetch_id = $1 AND status NOT IN ('complete', 'errored')
            ",
        )
        .bind(fetch_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// How many fetches in a scan are still in flight
    pub async fn count_nonterminal_by_scan(&self, scan_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM fetches
            WHERE scan_id = $1 AND status NOT IN ('complete', 'errored')
            ",
        )
        .bind(scan_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn count_by_status(&self, scan_id: Uuid, status: FetchStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM fetches
            WHERE scan_id = $1 AND status = $2
            ",
        )
        .bind(scan_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

fn row_to_fetch(row: &PgRow) -> Result<Fetch> {
    let status: String = row.try_get("status")?;
    Ok(Fetch {
        fetch_id: row.try_get("fetch_id")?,
        scan_id: row.try_get("scan_id")?,
        channel_owner_id: row.try_get("channel_owner_id")?,
        category_id: row.try_get("category_id")?,
        stream_id: row.try_get("stream_id")?,
        viewer_count: row.try_get("viewer_count")?,
        stream_started_at: row.try_get("stream_started_at")?,
        language: row.try_get("language")?,
        is_mature: row.try_get("is_mature")?,
        was_live: row.try_get("was_live")?,
        status: FetchStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown fetch status '{status}'")))?,
        fetch_action_at: row.try_get("fetch_action_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
    })
}
