//! Durable change-feed cursor, one per metric.
//!
//! Every operation is a single statement, so a crash leaves either the old
//! token or the new one, never a mix.

use crate::error::{TrackerError, Result};
use crate::state::StateManager;
use crate::types::MetricType;
use chrono::Utc;
use tracing::{debug, instrument};

/// Persistence for the opaque source token of one metric.
#[derive(Clone)]
pub struct CursorStore {
    state: StateManager,
    metric: MetricType,
}

impl CursorStore {
    pub fn new(state: StateManager, metric: MetricType) -> Self {
        Self { state, metric }
    }

    /// Load the saved token. `None` means the metric was never synced.
    #[instrument(skip(self), fields(metric = %self.metric))]
    pub async fn load(&self) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT token FROM sync_cursors WHERE metric = ?")
            .bind(self.metric.as_str())
            .fetch_optional(self.state.pool())
            .await
            .map_err(|e| {
                metrics::counter!("tracker_db_errors_total", "operation" => "load_cursor")
                    .increment(1);
                TrackerError::DatabaseError(e.to_string())
            })
    }

    /// Replace the saved token.
    #[instrument(skip(self, token), fields(metric = %self.metric))]
    pub async fn save(&self, token: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (metric, token, updated_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(metric) DO UPDATE SET
                token = excluded.token,
                updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(self.metric.as_str())
        .bind(token)
        .bind(Utc::now().timestamp_millis())
        .execute(self.state.pool())
        .await
        .map_err(|e| {
            metrics::counter!("tracker_db_errors_total", "operation" => "save_cursor").increment(1);
            TrackerError::DatabaseError(e.to_string())
        })?;

        debug!("Saved change cursor");
        Ok(())
    }

    /// Forget the token so the next pass runs a full sync.
    #[instrument(skip(self), fields(metric = %self.metric))]
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM sync_cursors WHERE metric = ?")
            .bind(self.metric.as_str())
            .execute(self.state.pool())
            .await
            .map_err(|e| {
                metrics::counter!("tracker_db_errors_total", "operation" => "clear_cursor")
                    .increment(1);
                TrackerError::DatabaseError(e.to_string())
            })?;

        debug!("Cleared change cursor");
        Ok(())
    }
}
