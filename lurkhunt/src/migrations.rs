use anyhow::Result;
use sqlx::PgPool;
use tracing::{error, info};

/// Run database migrations. Every role runs this at startup; the migrator's
/// own locking keeps concurrent starters from stepping on each other.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            anyhow::anyhow!("Migration failed: {e}")
        })?;

    info!("Migrations completed");
    Ok(())
}
