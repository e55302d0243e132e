use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::{
    models::{Scan, StopReason},
    Error, Result,
};

/// Scan repository for database operations
#[derive(Clone)]
pub struct ScanRepository {
    pool: PgPool,
}

impl ScanRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new scan row
    pub async fn create(&self, scan: &Scan) -> Result<Scan> {
        let row = sqlx::query(
            r"
            INSERT INTO scans (scan_id, started_at, ended_at, stop_reason,
                               streams_targeted, viewerlists_fetched, error_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING scan_id, started_at, ended_at, stop_reason,
                      streams_targeted, viewerlists_fetched, error_count
            ",
        )
        .bind(scan.scan_id)
        .bind(scan.started_at)
        .bind(scan.ended_at)
        .bind(scan.stop_reason.as_str())
        .bind(scan.streams_targeted)
        .bind(scan.viewerlists_fetched)
        .bind(scan.error_count)
        .fetch_one(&self.pool)
        .await?;

        row_to_scan(&row)
    }

    pub async fn get(&self, scan_id: Uuid) -> Result<Option<Scan>> {
        let row = sqlx::query(
            r"
            SELECT scan_id, started_at, ended_at, stop_reason,
                   streams_targeted, viewerlists_fetched, error_count
            FROM scans
            WHERE scan_id = $1
            ",
        )
        .bind(scan_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_scan(&row)?)),
            None => Ok(None),
        }
    }

    /// Record the number of streams the enumerator targeted for this scan
    pub async fn set_streams_targeted(&self, scan_id: Uuid, count: i64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scans SET streams_targeted = $2
            WHERE scan_id = $1
            ",
        )
        .bind(scan_id)
        .bind(count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close out a scan. Only moves a row out of `in_progress`; finalizing an
    /// already-terminal scan is a no-op returning false.
    pub async fn finalize(
        &self,
        scan_id: Uuid,
        stop_reason: StopReason,
        ended_at: DateTime<Utc>,
        viewerlists_fetched: i64,
        error_count: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE scans
            SET stop_reason = $2, ended_at = $3,
                viewerlists_fetched = $4, error_count = $5
            WHERE scan_id = $1 AND stop_reason = 'in_progress'
            ",
        )
        .bind(scan_id)
        .bind(stop_reason.as_str())
        .bind(ended_at)
        .bind(viewerlists_fetched)
        .bind(error_count)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_scan(row: &PgRow) -> Result<Scan> {
    let stop_reason: String = row.try_get("stop_reason")?;
    Ok(Scan {
        scan_id: row.try_get("scan_id")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        stop_reason: StopReason::parse(&stop_reason)
            .ok_or_else(|| Error::Internal(format!("Unknown stop_reason '{stop_reason}'")))?,
        streams_targeted: row.try_get("streams_targeted")?,
        viewerlists_fetched: row.try_get("viewerlists_fetched")?,
        error_count: row.try_get("error_count")?,
    })
}
