//! SurrealDB row types for the history tables.
//!
//! Rows are converted to/from `storage_traits` types at the boundary so the
//! database representation never leaks into the run pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{RunOutcome, RunStatus, StorageResult};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// One row of the `run_history` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub requested_by: String,
    pub playbook_id: String,
    /// "success" | "failure"
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub executed_at: DateTime<Utc>,
}

impl HistoryRow {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            id: None,
            requested_by: outcome.requested_by.clone(),
            playbook_id: outcome.playbook_id.clone(),
            status: outcome.status.as_str().to_string(),
            executed_at: outcome.timestamp,
        }
    }

    pub fn into_outcome(self) -> StorageResult<RunOutcome> {
        let status: RunStatus = self.status.parse()?;
        Ok(RunOutcome {
            requested_by: self.requested_by,
            playbook_id: self.playbook_id,
            status,
            timestamp: self.executed_at,
        })
    }
}
