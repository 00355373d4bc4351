//! Storage layer error types
//!
//! All errors that can occur while managing repositories and records are
//! defined here. We use `thiserror` for ergonomic error definition and
//! `ErrorKind` for callers that only care about the broad class of failure.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::InvalidNameError;

/// broad classification of a storage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// required input was empty or malformed
    InvalidArgument,
    /// the target already exists
    AlreadyExists,
    /// the target does not exist
    NotFound,
    /// file system or version control failure
    Io,
    /// stored metadata could not be decoded
    Decode,
    /// the repository is protected against the operation
    Protected,
}

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// required input was empty or malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// invalid repository or record name
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// a versioned directory is already present at the path
    #[error("repository already exists: {0}")]
    RepoAlreadyExists(PathBuf),

    /// no versioned directory at the path
    #[error("repository not found: {0}")]
    RepoNotFound(PathBuf),

    /// the metadata entry does not exist
    #[error("meta-data not found: {0}")]
    MetaNotFound(PathBuf),

    /// the repository is protected and cannot be removed
    #[error("repository is protected: {0}")]
    Protected(String),

    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// file system error with the operation and path that failed
    #[error("{op} failed for {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// metadata could not be serialized
    #[error("cannot encode meta-data for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// stored metadata could not be deserialized
    #[error("cannot decode meta-data at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// wrap an I/O error with the failing operation and path
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::InvalidArgument(_) | StorageError::InvalidName(_) => {
                ErrorKind::InvalidArgument
            }
            StorageError::RepoAlreadyExists(_) => ErrorKind::AlreadyExists,
            StorageError::RepoNotFound(_) | StorageError::MetaNotFound(_) => ErrorKind::NotFound,
            StorageError::Protected(_) => ErrorKind::Protected,
            StorageError::Io { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
                _ => ErrorKind::Io,
            },
            StorageError::Git(e) if e.code() == git2::ErrorCode::NotFound => ErrorKind::NotFound,
            StorageError::Git(_) | StorageError::Encode { .. } => ErrorKind::Io,
            StorageError::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// check if this error indicates the resource is already there
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
