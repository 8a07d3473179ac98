//! File-backed inventory store.
//!
//! The inventory file is the only source of truth: every call re-reads it
//! and nothing is cached between calls. All operations on one file go through
//! a lock keyed by that file's path, so a rewrite (`remove`, `write_raw`)
//! can never interleave with another rewrite, an append, or a read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::error::{InventoryError, InventoryResult};
use super::model::{remove_host_lines, HostRecord, Inventory};
use super::request::{validate_hostname, AddHostRequest};

type FileLock = Arc<tokio::sync::Mutex<()>>;

/// One async lock per inventory file, shared by every store on that file.
///
/// Existing files are keyed by their resolved path so a symlink and its
/// target share a lock.
fn lock_for(path: &Path) -> FileLock {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, FileLock>>> = OnceLock::new();
    let key = std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf());
    let mut locks = LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(locks.entry(key).or_default())
}

/// Inventory operations over one INI file.
#[derive(Debug, Clone)]
pub struct InventoryStore {
    path: PathBuf,
    lock: FileLock,
}

impl InventoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock = lock_for(&path);
        Self { path, lock }
    }

    /// Path handed to the orchestrator as its inventory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the current file. A missing file is an empty inventory.
    pub async fn inventory(&self) -> InventoryResult<Inventory> {
        let _guard = self.lock.lock().await;
        let text = self.read_text().await?;
        Ok(Inventory::parse(&text))
    }

    /// Every host with its group and address.
    pub async fn list(&self) -> InventoryResult<Vec<HostRecord>> {
        Ok(self.inventory().await?.hosts())
    }

    /// Append a host under a fresh `[group]` header.
    ///
    /// Existing content is never rewritten. The request is validated before
    /// the file is opened.
    #[instrument(skip(self, request), fields(path = %self.path.display()))]
    pub async fn add(&self, request: AddHostRequest) -> InventoryResult<HostRecord> {
        let record = request.validate()?;

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| InventoryError::from_io(e, &self.path))?;
        file.write_all(record.append_text().as_bytes())
            .await
            .map_err(|e| InventoryError::from_io(e, &self.path))?;
        file.flush()
            .await
            .map_err(|e| InventoryError::from_io(e, &self.path))?;

        crate::obs::emit_inventory_mutated("add", &record.hostname, 1);
        Ok(record)
    }

    /// Remove every line whose first token is `hostname`.
    ///
    /// Returns the number of lines removed. A missing file is left missing.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn remove(&self, hostname: &str) -> InventoryResult<usize> {
        let hostname = validate_hostname(hostname)?;

        let _guard = self.lock.lock().await;
        if !self.exists().await {
            debug!(hostname = %hostname, "inventory missing, nothing to remove");
            return Ok(0);
        }
        let text = self.read_text().await?;
        let (kept, removed) = remove_host_lines(&text, &hostname);
        if removed > 0 {
            self.replace(kept).await?;
        }

        crate::obs::emit_inventory_mutated("remove", &hostname, removed);
        Ok(removed)
    }

    /// Whole file contents; empty when the file does not exist.
    pub async fn read_raw(&self) -> InventoryResult<String> {
        let _guard = self.lock.lock().await;
        self.read_text().await
    }

    /// Replace the whole file. No structural validation is performed.
    #[instrument(skip(self, content), fields(path = %self.path.display(), bytes = content.len()))]
    pub async fn write_raw(&self, content: &str) -> InventoryResult<()> {
        let _guard = self.lock.lock().await;
        self.replace(content.to_string()).await?;
        crate::obs::emit_inventory_mutated("write_raw", "*", 0);
        Ok(())
    }

    // -- private helpers, callers hold the lock -------------------------------

    async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn read_text(&self) -> InventoryResult<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(InventoryError::from_io(e, &self.path)),
        }
    }

    /// Rewrite the file in place, following symlinks and keeping its
    /// owner and mode. Serialized by the path lock held by the caller.
    async fn replace(&self, content: String) -> InventoryResult<()> {
        let io_err = |e: std::io::Error| InventoryError::from_io(e, &self.path);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(content.as_bytes()).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        Ok(())
    }
}
