//! Database API - the registry of repositories under one root directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::repo::{RepoInfo, Repository};
use crate::storage::{
    sanitize, CommitOptions, GitBackend, GitSignature, JsonFileStore, MetadataStore, RepoName,
    StorageError, StorageResult, VersionControl,
};

/// Default folder holding metadata files.
pub const DEFAULT_META_DIR: &str = "meta-data";

/// Default message for commits the database makes on its own behalf.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "db-repo";

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory holding one subdirectory per repository.
    pub root: PathBuf,
    /// Folder name used for metadata files inside every record folder.
    pub meta_dir: String,
    /// Identity for database-internal commits, and the fallback identity
    /// for caller commits that do not set one.
    pub signature: GitSignature,
    /// Message for database-internal commits.
    pub system_message: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".repodb"),
            meta_dir: DEFAULT_META_DIR.to_string(),
            signature: GitSignature::repodb(),
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration with the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Set the metadata folder name.
    pub fn meta_dir(mut self, value: impl Into<String>) -> Self {
        self.meta_dir = value.into();
        self
    }

    /// Set the database commit identity.
    pub fn signature(mut self, value: GitSignature) -> Self {
        self.signature = value;
        self
    }

    /// Set the message for database-internal commits.
    pub fn system_message(mut self, value: impl Into<String>) -> Self {
        self.system_message = value.into();
        self
    }
}

/// State shared by a database and every repository it hands out.
pub(crate) struct DatabaseInner {
    pub(crate) config: DatabaseConfig,
    pub(crate) vcs: Box<dyn VersionControl>,
    pub(crate) meta: Box<dyn MetadataStore>,
}

impl DatabaseInner {
    /// Commit options for changes the database makes itself.
    pub(crate) fn system_commit(&self) -> CommitOptions {
        CommitOptions::new(self.config.system_message.clone()).author(self.config.signature.clone())
    }
}

/// The main database handle.
///
/// Creating, opening and removing repositories is serialized by one
/// registry-wide lock. Listing is not, so a listing that races a create or
/// remove may include or miss that repository.
pub struct Database {
    inner: Arc<DatabaseInner>,
    registry: Mutex<()>,
}

impl Database {
    /// Open a database rooted at `root` with the default configuration.
    ///
    /// Nothing is created on disk until the first repository is.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::open_with_config(DatabaseConfig::new(root))
    }

    /// Open a database with custom configuration.
    pub fn open_with_config(config: DatabaseConfig) -> Self {
        Self::open_with_backends(config, GitBackend, JsonFileStore)
    }

    /// Open a database with custom version control and metadata engines.
    pub fn open_with_backends(
        config: DatabaseConfig,
        vcs: impl VersionControl + 'static,
        meta: impl MetadataStore + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                config,
                vcs: Box::new(vcs),
                meta: Box::new(meta),
            }),
            registry: Mutex::new(()),
        }
    }

    /// Get the database root.
    pub fn root(&self) -> &Path {
        &self.inner.config.root
    }

    /// Get the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    /// Create a repository described by `info`.
    ///
    /// The name is sanitized first. The new repository's metadata is written
    /// and committed as its first commit.
    pub fn create_repo(&self, info: RepoInfo) -> StorageResult<Repository> {
        let _registry = self.registry.lock();

        let name = RepoName::new(&info.name)?;
        let repo = Repository::new(Arc::clone(&self.inner), name, info);

        self.inner.vcs.init(repo.dir())?;
        repo.save_info()?;

        tracing::debug!(repo = repo.name(), dir = %repo.dir().display(), "created repository");
        Ok(repo)
    }

    /// Open the repository called `name` (sanitized).
    ///
    /// Every call loads the metadata into a fresh instance.
    pub fn open_repo(&self, name: &str) -> StorageResult<Repository> {
        let _registry = self.registry.lock();
        let name = RepoName::new(name)?;
        self.open_locked(name)
    }

    /// Delete the repository called `name` and its whole history.
    ///
    /// Protected repositories are refused. This cannot be undone.
    pub fn remove_repo(&self, name: &str) -> StorageResult<()> {
        let _registry = self.registry.lock();
        let name = RepoName::new(name)?;
        let repo = self.open_locked(name)?;

        if repo.is_protected() {
            return Err(StorageError::Protected(repo.name().to_string()));
        }

        fs::remove_dir_all(repo.dir())
            .map_err(|e| StorageError::io("remove repository", repo.dir(), e))?;

        tracing::debug!(repo = repo.name(), "removed repository");
        Ok(())
    }

    /// List every loadable repository under the root.
    ///
    /// Entries that are not repositories or whose metadata cannot be loaded
    /// are skipped. Order follows the directory listing.
    pub fn list_repos(&self) -> Vec<Repository> {
        let entries = match fs::read_dir(self.root()) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            // a directory whose name changes under sanitizing is not a repository
            .filter(|name| sanitize(name) == *name)
            .filter_map(|name| self.open_repo(&name).ok())
            .collect()
    }

    fn open_locked(&self, name: RepoName) -> StorageResult<Repository> {
        let repo = Repository::load(Arc::clone(&self.inner), name)?;
        tracing::trace!(repo = repo.name(), "opened repository");
        Ok(repo)
    }
}
