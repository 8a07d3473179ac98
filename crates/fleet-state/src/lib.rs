//! fleet-state: persistence collaborators for fleetrun
//!
//! The run pipeline depends on two stores it does not own:
//!
//! - `HistoryRecorder`: receives one `RunOutcome` per finished run
//!   (`SurrealHistoryRecorder`, backed by SurrealDB)
//! - `PlaybookCatalog`: resolves playbook ids to files
//!   (`FsPlaybookCatalog`, backed by a directory)
//!
//! In-memory fakes for both live in [`fakes`].

mod error;
pub mod fakes;
mod migrations;
pub mod playbooks;
mod schema;
pub mod storage_traits;
pub mod surreal_history;

pub use error::{StateError, StorageError};
pub use playbooks::FsPlaybookCatalog;
pub use storage_traits::{
    is_playbook_file, playbook_id_for, validate_playbook_id, ContentDigest, HistoryRecorder,
    PlaybookCatalog, PlaybookEntry, RunOutcome, RunStatus, StorageResult,
};
pub use surreal_history::{
    connect_or_unavailable, SurrealHistoryRecorder, UnavailableHistory, DEFAULT_HISTORY_URL,
};

/// Result type for fleet-state connection operations
pub type Result<T> = std::result::Result<T, StateError>;
