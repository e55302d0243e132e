//! Role runners: admin surface, scan conductor, fetcher worker.
//!
//! Each role is its own OS process; everything they share crosses through
//! Postgres or Redis, never memory.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::watch;
use tracing::{error, info};

use lurkhunt_api::AppState;
use lurkhunt_core::cache::SightingsCache;
use lurkhunt_core::conductor::{EnumerationStatus, ScanConductor};
use lurkhunt_core::credentials::CredentialManager;
use lurkhunt_core::enumerator::StreamEnumerator;
use lurkhunt_core::fetcher::{ViewerListFetcher, WorkerStores};
use lurkhunt_core::irc::{ChannelListener, TcpIrcConnection};
use lurkhunt_core::queue::{QueueDetails, RedisSharedQueue};
use lurkhunt_core::repository::{
    CategoryRepository, CredentialRepository, FetchRepository, ScanRepository,
    SightingRepository, UserProfileRepository,
};
use lurkhunt_core::twitch::{StreamsQuery, TwitchApiConfig};
use lurkhunt_core::Config;

use crate::migrations;

async fn init_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
        .connect(&config.database.url)
        .await?;
    Ok(pool)
}

fn credential_manager(pool: &PgPool, config: &Config) -> Arc<CredentialManager> {
    let store = Arc::new(CredentialRepository::new(pool.clone()));
    let template = TwitchApiConfig {
        access_token: String::new(),
        client_id: config.twitch.client_id.clone(),
        client_secret: config.twitch.client_secret.clone(),
        base_url: config.twitch.base_url.clone(),
        oauth_url: config.twitch.oauth_url.clone(),
    };
    Arc::new(CredentialManager::new(store, template))
}

fn pending_details() -> QueueDetails {
    QueueDetails::new("pending")
}

fn workbench_details(config: &Config) -> QueueDetails {
    QueueDetails::new("workbench").with_size_limit(config.scan.join_limit_count)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

/// Flip a watch flag when the shutdown signal arrives.
fn watch_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });
    rx
}

/// The HTTP admin surface.
pub async fn serve(config: Config) -> Result<()> {
    let pool = init_pool(&config).await?;
    migrations::run_migrations(&pool).await?;

    let credentials = credential_manager(&pool, &config);
    let app = lurkhunt_api::create_router(AppState { credentials });

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Admin surface listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Conduct one scan: enumerate live streams into the backlog and drip them
/// onto the workbench inside the join allowance, until everything drains or
/// the operator cancels.
pub async fn run_scan(config: Config, filters: StreamsQuery) -> Result<()> {
    let pool = init_pool(&config).await?;
    migrations::run_migrations(&pool).await?;

    let credentials = credential_manager(&pool, &config);
    let pending = Arc::new(RedisSharedQueue::connect(&config.redis.url, &pending_details()).await?);
    let workbench =
        Arc::new(RedisSharedQueue::connect(&config.redis.url, &workbench_details(&config)).await?);
    let cache = SightingsCache::connect(
        &config.redis.url,
        config.scan.cache_shards,
        &config.redis.key_prefix,
    )
    .await?;

    let mut conductor = ScanConductor::new(
        ScanRepository::new(pool.clone()),
        FetchRepository::new(pool.clone()),
        pending.clone(),
        workbench,
        cache,
        Duration::from_secs(config.scan.join_window_seconds),
        watch_shutdown(),
    );

    let scan = conductor.begin().await?;
    let scan_id = scan.scan_id;

    let (enum_tx, enum_rx) = watch::channel(EnumerationStatus::Running);
    let enumerator = StreamEnumerator::new(credentials, pending, filters);
    let scans = ScanRepository::new(pool.clone());
    tokio::spawn(async move {
        match enumerator.run(scan_id).await {
            Ok(targeted) => {
                if let Err(e) = scans.set_streams_targeted(scan_id, targeted as i64).await {
                    error!("Failed to record targeted stream count: {e}");
                    let _ = enum_tx.send(EnumerationStatus::Failed);
                    return;
                }
                let _ = enum_tx.send(EnumerationStatus::Complete);
            }
            Err(e) => {
                error!("Stream enumeration failed: {e}");
                let _ = enum_tx.send(EnumerationStatus::Failed);
            }
        }
    });

    let reason = conductor.run(scan_id, enum_rx).await?;
    info!(scan_id = %scan_id, reason = reason.as_str(), "Scan run finished");
    Ok(())
}

/// One fetcher worker: a single chat connection plus the workbench handle.
pub async fn run_worker(config: Config, worker_id: String) -> Result<()> {
    let pool = init_pool(&config).await?;
    migrations::run_migrations(&pool).await?;

    let credentials = credential_manager(&pool, &config);
    let access_token = credentials.access_token().await?;

    let conn = TcpIrcConnection::connect(
        &config.twitch.irc_host,
        config.twitch.irc_port,
        &config.twitch.bot_login,
        &access_token,
    )
    .await
    .map_err(lurkhunt_core::Error::from)?;

    let listener = ChannelListener::new(
        Arc::new(conn),
        Duration::from_secs(config.scan.channel_timeout_seconds),
    );

    let workbench =
        Arc::new(RedisSharedQueue::connect(&config.redis.url, &workbench_details(&config)).await?);
    let cache = SightingsCache::connect(
        &config.redis.url,
        config.scan.cache_shards,
        &config.redis.key_prefix,
    )
    .await?;

    let stores = WorkerStores {
        fetches: FetchRepository::new(pool.clone()),
        sightings: SightingRepository::new(pool.clone()),
        profiles: UserProfileRepository::new(pool.clone()),
        categories: CategoryRepository::new(pool.clone()),
        cache,
    };

    let mut fetcher = ViewerListFetcher::new(
        worker_id,
        workbench,
        listener,
        stores,
        Duration::from_secs(config.scan.dequeue_timeout_seconds),
        config.scan.write_retry_attempts,
        watch_shutdown(),
    );

    fetcher.processing_loop().await?;
    Ok(())
}
