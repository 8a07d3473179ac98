//! SurrealDB schema initialization for the history store.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all fleetrun tables in SurrealDB.
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing fleetrun SurrealDB schema");
    init_run_history_table(db).await?;
    Ok(())
}

/// Initialize `run_history` table
///
/// Schema:
/// ```text
/// TABLE run_history {
///   requested_by:  STRING (indexed)
///   playbook_id:   STRING (indexed)
///   status:        STRING (enum: success | failure)
///   executed_at:   DATETIME (indexed)
/// }
/// ```
///
/// Rows are append-only: outcomes are never updated or deleted.
async fn init_run_history_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing run_history table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS run_history AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_history_executed_at ON TABLE run_history COLUMNS executed_at;
        DEFINE INDEX IF NOT EXISTS idx_history_playbook ON TABLE run_history COLUMNS playbook_id;
        DEFINE INDEX IF NOT EXISTS idx_history_requested_by ON TABLE run_history COLUMNS requested_by;
    "#;

    db.query(sql).await?.check()?;
    debug!("run_history table initialized");
    Ok(())
}
