//! State management with SQLite persistence.
//!
//! The StateManager owns the database shared by every collector:
//! - Hour buckets per metric (see [`crate::cache::BucketCache`])
//! - Change-feed cursors per metric (see [`CursorStore`])

use crate::error::{TrackerError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

mod cursor;
pub mod migrations;

pub use cursor::CursorStore;


/// State manager for persistent storage.
#[derive(Clone)]
pub struct StateManager {
    pool: SqlitePool,
}

impl StateManager {
    /// Create a new StateManager with an in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a new StateManager with a database at the specified path.
    #[instrument(skip(db_path))]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let in_memory = db_path == Path::new(":memory:");
        info!("Initializing state manager at {:?}", db_path);

        // Create parent directory if it doesn't exist (but not for :memory:)
        if !in_memory {
            if let Some(parent) = db_path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| TrackerError::IoError {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(db_path.to_str().ok_or_else(|| {
            TrackerError::InvalidConfig { reason: "Invalid database path".to_string() }
        })?)
        .map_err(|e| TrackerError::DatabaseError(e.to_string()))?;

        options = options
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .log_statements(tracing::log::LevelFilter::Debug);
        if !in_memory {
            // Readers keep going while a sync pass holds the write lock.
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives in a single shared-cache connection.
        // Recycling that connection would drop the database with it.
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options.max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            pool_options.max_connections(5)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| TrackerError::DatabaseError(e.to_string()))?;

        let manager = Self { pool };

        manager.run_migrations().await?;

        info!("State manager initialized successfully");
        Ok(manager)
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        migrations::run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Close the pool, waiting for in-flight statements.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
