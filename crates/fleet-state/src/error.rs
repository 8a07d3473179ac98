//! Error types for fleet-state

use thiserror::Error;

/// Errors that can occur while connecting to the history database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the storage traits.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested item does not exist
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The backing store refused a write
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// Identifier failed validation (path separators, empty, ...)
    #[error("invalid id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    /// Database backend failure
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Other filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Map an io error on `path`, keeping permission failures distinct.
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path: path.display().to_string(),
            },
            std::io::ErrorKind::NotFound => StorageError::NotFound {
                what: path.display().to_string(),
            },
            _ => StorageError::Io(err),
        }
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};
    use std::path::Path;

    #[test]
    fn permission_denied_is_mapped() {
        let err = StorageError::from_io(
            Error::new(ErrorKind::PermissionDenied, "nope"),
            Path::new("/etc/ansible/playbooks/site.yml"),
        );
        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.to_string().contains("site.yml"));
    }

    #[test]
    fn not_found_is_mapped() {
        let err = StorageError::from_io(Error::new(ErrorKind::NotFound, "gone"), Path::new("x"));
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn other_io_passes_through() {
        let err = StorageError::from_io(Error::new(ErrorKind::Other, "disk"), Path::new("x"));
        assert!(matches!(err, StorageError::Io(_)));
    }
}
