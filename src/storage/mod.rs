//! storage layer for RepoDB
//!
//! this module holds the leaf components the repository layer is built on.
//! The upper layer (`db`) uses these APIs and never touches git2 or the
//! file layout of metadata directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 db::Database / db::Repository               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │     vcs     │       │    meta     │       │   record    │
//!  │  (commits)  │       │ (json kv)   │       │ (locations) │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!                                                     │
//!                                                     ▼
//!                                              ┌─────────────┐
//!                                              │    path     │
//!                                              │ (sanitize)  │
//!                                              └─────────────┘
//! ```

mod commit;
mod errors;
mod meta;
mod path;
mod record;
mod types;
mod vcs;

// Re-export public API
pub use commit::{CommitInfo, CommitMessage, CommitOptions};
pub use errors::{ErrorKind, StorageError, StorageResult};
pub use meta::{JsonFileStore, MetadataStore};
pub use path::{is_contained, is_single_component, sanitize};
pub use record::{FileRecord, Record, RecordLocation};
pub use types::{CommitId, GitSignature, InvalidNameError, RepoName};
pub use vcs::{GitBackend, VersionControl};
