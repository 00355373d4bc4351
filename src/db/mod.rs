//! Repository registry and per-repository record operations.
//!
//! [`Database`] owns a root directory and creates, opens, lists and removes
//! the repositories below it. [`Repository`] writes, reads and removes
//! record content and metadata, committing every change.

mod api;
mod repo;

pub use api::{Database, DatabaseConfig, DEFAULT_META_DIR, DEFAULT_SYSTEM_MESSAGE};
pub use repo::{RepoInfo, Repository};

pub use crate::storage::CommitOptions;
