//! Error types for the inventory module.

use std::path::Path;

/// Errors produced by the inventory store.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("permission denied writing inventory {path}")]
    PermissionDenied { path: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("inventory io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl InventoryError {
    /// Map an io error on `path`, keeping permission failures distinct.
    pub fn from_io(source: std::io::Error, path: &Path) -> Self {
        let path = path.display().to_string();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => InventoryError::PermissionDenied { path },
            _ => InventoryError::Io { path, source },
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, InventoryError::PermissionDenied { .. })
    }
}

/// Result type for inventory operations.
pub type InventoryResult<T> = std::result::Result<T, InventoryError>;
