//! Filesystem-backed playbook catalog.
//!
//! Layout: `<playbooks_dir>/<id>` where `id` is a plain `.yml`/`.yaml` file name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{
    is_playbook_file, playbook_id_for, validate_playbook_id, PlaybookCatalog, PlaybookEntry,
    StorageResult,
};

/// Playbook catalog rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsPlaybookCatalog {
    dir: PathBuf,
}

impl FsPlaybookCatalog {
    /// Create a catalog rooted at `dir`. Creates the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::from_io(e, &dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl PlaybookCatalog for FsPlaybookCatalog {
    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let path = self.path_of(id)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    fn path_of(&self, id: &str) -> StorageResult<PathBuf> {
        validate_playbook_id(id)?;
        Ok(self.dir.join(id))
    }

    async fn list(&self) -> StorageResult<Vec<PlaybookEntry>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(StorageError::from_io(e, &self.dir)),
        };

        while let Some(item) = dir.next_entry().await? {
            let Some(name) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_playbook_file(&name) {
                continue;
            }
            let path = item.path();
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StorageError::from_io(e, &path))?;
            entries.push(PlaybookEntry::new(name, content));
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    async fn save(&self, name: &str, content: &str) -> StorageResult<PlaybookEntry> {
        let id = playbook_id_for(name);
        let path = self.path_of(&id)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| StorageError::from_io(e, &path))?;
        debug!(playbook = %id, bytes = content.len(), "playbook saved");
        Ok(PlaybookEntry::new(id, content))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.path_of(id)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StorageError::from_io(e, &path))?;
        debug!(playbook = %id, "playbook deleted");
        Ok(())
    }
}
