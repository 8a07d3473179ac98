//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryHistoryRecorder` and `MemoryPlaybookCatalog` that satisfy
//! the trait contracts without any external dependencies.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryHistoryRecorder
// ---------------------------------------------------------------------------

/// In-memory history backed by a `Vec<RunOutcome>` (oldest first).
///
/// `set_failing(true)` makes every `record` call fail with a backend error,
/// which lets callers exercise the recorder-failure path.
#[derive(Debug, Default)]
pub struct MemoryHistoryRecorder {
    outcomes: Mutex<Vec<RunOutcome>>,
    failing: AtomicBool,
}

impl MemoryHistoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose writes always fail.
    pub fn failing() -> Self {
        let recorder = Self::default();
        recorder.set_failing(true);
        recorder
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every recorded outcome, oldest first.
    pub fn outcomes(&self) -> Vec<RunOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryRecorder for MemoryHistoryRecorder {
    async fn record(&self, outcome: &RunOutcome) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("history store unavailable".into()));
        }
        self.outcomes.lock().unwrap().push(outcome.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StorageResult<Vec<RunOutcome>> {
        let outcomes = self.outcomes.lock().unwrap();
        Ok(outcomes.iter().rev().take(limit).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryPlaybookCatalog
// ---------------------------------------------------------------------------

/// In-memory playbook catalog backed by a `BTreeMap<id, content>`.
///
/// `path_of` returns paths under a virtual root that never exists on disk.
#[derive(Debug)]
pub struct MemoryPlaybookCatalog {
    root: PathBuf,
    playbooks: Mutex<BTreeMap<String, String>>,
}

impl Default for MemoryPlaybookCatalog {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/nonexistent/fleetrun/playbooks"),
            playbooks: Mutex::new(BTreeMap::new()),
        }
    }
}

impl MemoryPlaybookCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog whose `path_of` resolves under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl PlaybookCatalog for MemoryPlaybookCatalog {
    async fn exists(&self, id: &str) -> StorageResult<bool> {
        validate_playbook_id(id)?;
        Ok(self.playbooks.lock().unwrap().contains_key(id))
    }

    fn path_of(&self, id: &str) -> StorageResult<PathBuf> {
        validate_playbook_id(id)?;
        Ok(self.root.join(id))
    }

    async fn list(&self) -> StorageResult<Vec<PlaybookEntry>> {
        let playbooks = self.playbooks.lock().unwrap();
        Ok(playbooks
            .iter()
            .map(|(id, content)| PlaybookEntry::new(id.clone(), content.clone()))
            .collect())
    }

    async fn save(&self, name: &str, content: &str) -> StorageResult<PlaybookEntry> {
        let id = playbook_id_for(name);
        validate_playbook_id(&id)?;
        self.playbooks
            .lock()
            .unwrap()
            .insert(id.clone(), content.to_string());
        Ok(PlaybookEntry::new(id, content))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        validate_playbook_id(id)?;
        self.playbooks
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                what: format!("playbook {id}"),
            })
    }
}
