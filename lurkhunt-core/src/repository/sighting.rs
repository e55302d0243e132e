use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ViewerSighting, Result};

/// Viewer sighting repository for database operations
#[derive(Clone)]
pub struct SightingRepository {
    pool: PgPool,
}

impl SightingRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create one sighting row
    pub async fn create(&self, sighting: &ViewerSighting) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO viewer_sightings (sighting_id, fetch_id, viewer_login_name,
                                          enriched, aggregated)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(sighting.sighting_id)
        .bind(sighting.fetch_id)
        .bind(&sighting.viewer_login_name)
        .bind(sighting.enriched)
        .bind(sighting.aggregated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Write a whole viewer list in one transaction. A fetch's sightings
    /// either all land or none do.
    pub async fn create_batch(&self, sightings: &[ViewerSighting]) -> Result<()> {
        if sightings.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for sighting in sightings {
            sqlx::query(
                r"
                INSERT INTO viewer_sightings (sighting_id, fetch_id, viewer_login_name,
                                              enriched, aggregated)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(sighting.sighting_id)
            .bind(sighting.fetch_id)
            .bind(&sighting.viewer_login_name)
            .bind(sighting.enriched)
            .bind(sighting.aggregated)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Count sightings of a login across all fetches of one scan
    pub async fn count_by_scan_and_login(&self, scan_id: Uuid, login: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM viewer_sightings vs
            JOIN fetches f ON f.fetch_id = vs.fetch_id
            WHERE f.scan_id = $1 AND vs.viewer_login_name = $2
            ",
        )
        .bind(scan_id)
        .bind(login)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Prune sightings that both batch jobs have finished with
    pub async fn prune_processed(&self) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM viewer_sightings
            WHERE enriched AND aggregated
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_batch_insert_is_atomic() {
        // Integration test placeholder
    }
}
