//! Storage trait definitions for fleetrun
//!
//! These traits define the collaborators the run pipeline talks to:
//! - `HistoryRecorder`: one outcome row per finished run
//! - `PlaybookCatalog`: playbook files addressed by id (file name)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// HistoryRecorder - Run Outcome Persistence
// ---------------------------------------------------------------------------

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    /// `Success` iff the orchestrator exited with code zero.
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            RunStatus::Success
        } else {
            RunStatus::Failure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "failure" => Ok(RunStatus::Failure),
            other => Err(StorageError::Backend(format!("unknown run status: {other}"))),
        }
    }
}

/// Outcome of one completed run session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Identity of the operator who requested the run
    pub requested_by: String,
    /// Playbook id (file name) that was executed
    pub playbook_id: String,
    pub status: RunStatus,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
}

impl RunOutcome {
    /// Build an outcome stamped with the current time.
    pub fn new(
        requested_by: impl Into<String>,
        playbook_id: impl Into<String>,
        status: RunStatus,
    ) -> Self {
        Self {
            requested_by: requested_by.into(),
            playbook_id: playbook_id.into(),
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Run history sink.
///
/// Guarantees:
/// - `record` persists exactly the outcome it is given; it never mutates it.
/// - `recent` returns newest outcomes first.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    /// Persist one run outcome.
    async fn record(&self, outcome: &RunOutcome) -> StorageResult<()>;

    /// The `limit` most recent outcomes, newest first.
    async fn recent(&self, limit: usize) -> StorageResult<Vec<RunOutcome>>;
}

// ---------------------------------------------------------------------------
// PlaybookCatalog - Playbook Files
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string) of a playbook body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One playbook as listed by a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookEntry {
    /// File name, also used as the playbook id
    pub id: String,
    /// Display name (currently identical to the id)
    pub name: String,
    pub content: String,
    pub digest: ContentDigest,
}

impl PlaybookEntry {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        let content = content.into();
        Self {
            name: id.clone(),
            digest: ContentDigest::from_bytes(content.as_bytes()),
            id,
            content,
        }
    }
}

/// Playbook storage addressed by file name.
#[async_trait]
pub trait PlaybookCatalog: Send + Sync {
    /// Whether a playbook with this id exists.
    async fn exists(&self, id: &str) -> StorageResult<bool>;

    /// Filesystem path the orchestrator should be pointed at for `id`.
    ///
    /// Does not check existence; fails only when `id` is malformed.
    fn path_of(&self, id: &str) -> StorageResult<PathBuf>;

    /// All `.yml` / `.yaml` playbooks, sorted by id.
    async fn list(&self) -> StorageResult<Vec<PlaybookEntry>>;

    /// Create or overwrite a playbook, returning the stored entry.
    ///
    /// A `.yml` suffix is appended when `name` has neither `.yml` nor `.yaml`.
    async fn save(&self, name: &str, content: &str) -> StorageResult<PlaybookEntry>;

    /// Delete a playbook. Returns `StorageError::NotFound` if absent.
    async fn delete(&self, id: &str) -> StorageResult<()>;
}

/// Reject ids that could escape the playbook directory.
pub fn validate_playbook_id(id: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    if id.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if id.contains('/') || id.contains('\\') {
        return Err(invalid("must not contain path separators"));
    }
    if id == "." || id == ".." || id.contains('\0') {
        return Err(invalid("not a file name"));
    }
    Ok(())
}

/// Whether a file name looks like a playbook.
pub fn is_playbook_file(name: &str) -> bool {
    name.ends_with(".yml") || name.ends_with(".yaml")
}

/// Normalise a user-supplied playbook name into a catalog id.
pub fn playbook_id_for(name: &str) -> String {
    if is_playbook_file(name) {
        name.to_string()
    } else {
        format!("{name}.yml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_exit_code() {
        assert_eq!(RunStatus::from_exit_code(0), RunStatus::Success);
        assert_eq!(RunStatus::from_exit_code(2), RunStatus::Failure);
        assert_eq!(RunStatus::from_exit_code(-1), RunStatus::Failure);
    }

    #[test]
    fn status_string_forms() {
        assert_eq!(RunStatus::Success.to_string(), "success");
        assert_eq!("failure".parse::<RunStatus>().unwrap(), RunStatus::Failure);
        assert!("Sucesso".parse::<RunStatus>().is_err());
    }

    #[test]
    fn playbook_id_validation() {
        assert!(validate_playbook_id("site.yml").is_ok());
        assert!(validate_playbook_id("").is_err());
        assert!(validate_playbook_id("../hosts").is_err());
        assert!(validate_playbook_id("a/b.yml").is_err());
        assert!(validate_playbook_id("..").is_err());
    }

    #[test]
    fn playbook_name_gets_suffix() {
        assert_eq!(playbook_id_for("deploy"), "deploy.yml");
        assert_eq!(playbook_id_for("deploy.yml"), "deploy.yml");
        assert_eq!(playbook_id_for("deploy.yaml"), "deploy.yaml");
    }

    #[test]
    fn entry_digest_tracks_content() {
        let a = PlaybookEntry::new("a.yml", "- hosts: all");
        let b = PlaybookEntry::new("b.yml", "- hosts: all");
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.digest.short().len(), 12);
        assert_ne!(a.digest, PlaybookEntry::new("a.yml", "- hosts: web").digest);
    }
}
