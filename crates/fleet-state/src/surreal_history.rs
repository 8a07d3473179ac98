//! SurrealDB-backed HistoryRecorder implementation
//!
//! Uses `schema::HistoryRow` for persistence, converting to/from
//! `storage_traits::RunOutcome` at the boundary.

use std::sync::Arc;

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, warn};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::HistoryRow;
use crate::storage_traits::{HistoryRecorder, RunOutcome, StorageResult};

const NAMESPACE: &str = "fleetrun";
const DATABASE: &str = "main";

/// Default on-disk location when no URL is configured.
pub const DEFAULT_HISTORY_URL: &str = "surrealkv://.fleetrun/db";

/// SurrealDB-backed implementation of [`HistoryRecorder`].
#[derive(Clone)]
pub struct SurrealHistoryRecorder {
    db: Surreal<Any>,
}

impl SurrealHistoryRecorder {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect("mem://").await
    }

    /// Connect to `url` (`mem://`, `surrealkv://<dir>`, `ws://host:port`, ...),
    /// select `fleetrun/main`, and initialise the schema.
    ///
    /// For `surrealkv://` the directory is created first.
    pub async fn connect(url: &str) -> crate::Result<Self> {
        if let Some(path) = url.strip_prefix("surrealkv://") {
            std::fs::create_dir_all(path).map_err(|e| {
                StateError::Connection(format!(
                    "Failed to create database directory {}: {}",
                    path, e
                ))
            })?;
        }

        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!(url = %url, "SurrealHistoryRecorder connected");
        Ok(Self { db })
    }
}

/// Open the history store at `url`, or fall back to [`UnavailableHistory`]
/// when it cannot be reached.
///
/// Runs never depend on history being available; the connection error
/// surfaces again on every `record` call.
pub async fn connect_or_unavailable(url: &str) -> Arc<dyn HistoryRecorder> {
    match SurrealHistoryRecorder::connect(url).await {
        Ok(recorder) => Arc::new(recorder),
        Err(e) => {
            warn!(url = %url, error = %e, "run history unavailable");
            Arc::new(UnavailableHistory::new(format!("{url}: {e}")))
        }
    }
}

/// Recorder standing in for a history store that could not be opened.
#[derive(Debug, Clone)]
pub struct UnavailableHistory {
    reason: String,
}

impl UnavailableHistory {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> StorageError {
        StorageError::Backend(format!("history store unavailable: {}", self.reason))
    }
}

#[async_trait]
impl HistoryRecorder for UnavailableHistory {
    async fn record(&self, _outcome: &RunOutcome) -> StorageResult<()> {
        Err(self.error())
    }

    async fn recent(&self, _limit: usize) -> StorageResult<Vec<RunOutcome>> {
        Err(self.error())
    }
}

#[async_trait]
impl HistoryRecorder for SurrealHistoryRecorder {
    async fn record(&self, outcome: &RunOutcome) -> StorageResult<()> {
        let row = HistoryRow::from_outcome(outcome);
        debug!(
            playbook = %outcome.playbook_id,
            requested_by = %outcome.requested_by,
            status = %outcome.status,
            "recording run outcome"
        );

        let _created: Option<HistoryRow> = self
            .db
            .create("run_history")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> StorageResult<Vec<RunOutcome>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT * FROM run_history ORDER BY executed_at DESC LIMIT {limit}");
        let mut res = self
            .db
            .query(sql)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<HistoryRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(HistoryRow::into_outcome).collect()
    }
}
