//! Database migrations.

use crate::error::{TrackerError, Result};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 2;

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    // Create schema_version table if not exists
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| TrackerError::MigrationFailed { reason: e.to_string() })?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await
            .map_err(|e| TrackerError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    if current_version < 2 {
        migrate_to_v2(pool).await?;
    }

    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    // Hour buckets, one logical table per metric
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hour_buckets (
            metric TEXT NOT NULL,
            start_ms INTEGER NOT NULL,
            end_ms INTEGER NOT NULL,
            count INTEGER NOT NULL,
            zone_offset TEXT NOT NULL,
            synced_at_ms INTEGER NOT NULL,
            PRIMARY KEY (metric, start_ms)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| TrackerError::MigrationFailed { reason: e.to_string() })?;

    record_version(pool, 1).await
}

#[instrument(skip(pool))]
async fn migrate_to_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 2");

    // Change-feed cursor, one scalar per metric
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_cursors (
            metric TEXT PRIMARY KEY,
            token TEXT NOT NULL,
            updated_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| TrackerError::MigrationFailed { reason: e.to_string() })?;

    record_version(pool, 2).await
}

async fn record_version(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| TrackerError::MigrationFailed { reason: e.to_string() })?;
    Ok(())
}
