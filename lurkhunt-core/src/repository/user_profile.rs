use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{models::UserProfile, Result};

/// User profile repository for database operations
#[derive(Clone)]
pub struct UserProfileRepository {
    pool: PgPool,
}

impl UserProfileRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a partial profile on first sighting, or refresh the login name
    /// if the account renamed since we last saw it. Enrichment fields are
    /// left alone either way; those belong to the enricher batch.
    pub async fn upsert_partial(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO user_profiles (twitch_account_id, login_name, display_name,
                                       account_type, broadcaster_type, account_created_at,
                                       first_seen_as_viewer, last_seen_as_viewer,
                                       most_recent_concurrent_channels,
                                       all_time_high_concurrent_channels, all_time_high_at,
                                       enriched)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (twitch_account_id)
            DO UPDATE SET login_name = EXCLUDED.login_name
            ",
        )
        .bind(profile.twitch_account_id)
        .bind(&profile.login_name)
        .bind(&profile.display_name)
        .bind(&profile.account_type)
        .bind(&profile.broadcaster_type)
        .bind(profile.account_created_at)
        .bind(profile.first_seen_as_viewer)
        .bind(profile.last_seen_as_viewer)
        .bind(profile.most_recent_concurrent_channels)
        .bind(profile.all_time_high_concurrent_channels)
        .bind(profile.all_time_high_at)
        .bind(profile.enriched)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, twitch_account_id: i64) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            r"
            SELECT twitch_account_id, login_name, display_name, account_type,
                   broadcaster_type, account_created_at, first_seen_as_viewer,
                   last_seen_as_viewer, most_recent_concurrent_channels,
                   all_time_high_concurrent_channels, all_time_high_at, enriched
            FROM user_profiles
            WHERE twitch_account_id = $1
            ",
        )
        .bind(twitch_account_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_profile(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, twitch_account_id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r"
            SELECT 1::BIGINT FROM user_profiles WHERE twitch_account_id = $1
            ",
        )
        .bind(twitch_account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }
}

fn row_to_profile(row: &PgRow) -> Result<UserProfile> {
    Ok(UserProfile {
        twitch_account_id: row.try_get("twitch_account_id")?,
        login_name: row.try_get("login_name")?,
        display_name: row.try_get("display_name")?,
        account_type: row.try_get("account_type")?,
        broadcaster_type: row.try_get("broadcaster_type")?,
        account_created_at: row.try_get("account_created_at")?,
        first_seen_as_viewer: row.try_get("first_seen_as_viewer")?,
        last_seen_as_viewer: row.try_get("last_seen_as_viewer")?,
        most_recent_concurrent_channels: row.try_get("most_recent_concurrent_channels")?,
        all_time_high_concurrent_channels: row.try_get("all_time_high_concurrent_channels")?,
        all_time_high_at: row.try_get("all_time_high_at")?,
        enriched: row.try_get("enriched")?,
    })
}

#[cfg(test)]
mod tests {

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_upsert_refreshes_login_name_only() {
        // Integration test placeholder
    }
}
