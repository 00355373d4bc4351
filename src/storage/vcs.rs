//! Version control adapter.
//!
//! The repository layer only needs a handful of operations from the
//! versioning engine: create or open a working tree, stage everything,
//! check whether anything is staged, commit, and walk the history.
//! [`VersionControl`] is that contract; [`GitBackend`] implements it on
//! top of `git2`. Every call opens the working tree afresh, so no
//! `git2::Repository` handle is shared between threads.

use std::path::Path;

use git2::{ErrorCode, IndexAddOption, Repository, StatusOptions};

use crate::storage::commit::{CommitInfo, HistoryIterator};
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::types::{CommitId, GitSignature};

/// Operations the repository layer needs from a versioning engine.
pub trait VersionControl: Send + Sync {
    /// Create a new versioned directory, making the path if needed.
    ///
    /// Fails with `RepoAlreadyExists` if one is already present.
    fn init(&self, path: &Path) -> StorageResult<()>;

    /// Check that a versioned directory exists at the path.
    fn open(&self, path: &Path) -> StorageResult<()>;

    /// Stage every change in the working tree, deletions included.
    fn stage_all(&self, path: &Path) -> StorageResult<()>;

    /// True when neither the index nor the working tree differ from HEAD.
    fn is_clean(&self, path: &Path) -> StorageResult<bool>;

    /// Commit the staged tree on top of HEAD.
    fn commit(
        &self,
        path: &Path,
        message: &str,
        author: &GitSignature,
        committer: &GitSignature,
    ) -> StorageResult<CommitId>;

    /// Commits reachable from HEAD, newest first.
    fn history(&self, path: &Path, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>>;
}

/// [`VersionControl`] backed by libgit2.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitBackend;

impl GitBackend {
    fn open_repo(path: &Path) -> StorageResult<Repository> {
        Repository::open(path).map_err(|e| match e.code() {
            ErrorCode::NotFound => StorageError::RepoNotFound(path.to_path_buf()),
            _ => StorageError::Git(e),
        })
    }

    fn head_commit(repo: &Repository) -> StorageResult<Option<git2::Commit<'_>>> {
        match repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(None)
            }
            Err(e) => Err(StorageError::Git(e)),
        }
    }
}

impl VersionControl for GitBackend {
    fn init(&self, path: &Path) -> StorageResult<()> {
        if path.join(".git").exists() {
            return Err(StorageError::RepoAlreadyExists(path.to_path_buf()));
        }
        Repository::init(path)?;
        tracing::debug!(path = %path.display(), "initialized git repository");
        Ok(())
    }

    fn open(&self, path: &Path) -> StorageResult<()> {
        Self::open_repo(path).map(|_| ())
    }

    fn stage_all(&self, path: &Path) -> StorageResult<()> {
        let repo = Self::open_repo(path)?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        // add_all does not drop entries whose files are gone
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    fn is_clean(&self, path: &Path) -> StorageResult<bool> {
        let repo = Self::open_repo(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(statuses.is_empty())
    }

    fn commit(
        &self,
        path: &Path,
        message: &str,
        author: &GitSignature,
        committer: &GitSignature,
    ) -> StorageResult<CommitId> {
        let repo = Self::open_repo(path)?;
        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        let parent = Self::head_commit(&repo)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = repo.commit(
            Some("HEAD"),
            &author.to_git2_signature()?,
            &committer.to_git2_signature()?,
            message,
            &tree,
            &parents,
        )?;

        let id = CommitId::new(oid);
        tracing::debug!(path = %path.display(), commit = %id.short(), "created commit");
        Ok(id)
    }

    fn history(&self, path: &Path, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        let repo = Self::open_repo(path)?;
        let head = match Self::head_commit(&repo)? {
            Some(commit) => CommitId::new(commit.id()),
            None => return Ok(Vec::new()),
        };

        let iter = HistoryIterator::new(&repo, head)?;
        match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repo");
        GitBackend.init(&path).unwrap();
        (dir, path)
    }

    fn commit_all(path: &Path, message: &str) -> CommitId {
        let sig = GitSignature::repodb();
        GitBackend.stage_all(path).unwrap();
        GitBackend.commit(path, message, &sig, &sig).unwrap()
    }

    #[test]
    fn test_init_twice_fails() {
        let (_dir, path) = setup();
        let err = GitBackend.init(&path).unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = GitBackend.open(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StorageError::RepoNotFound(_)));

        // a plain directory is not a repository either
        let plain = dir.path().join("plain");
        fs::create_dir(&plain).unwrap();
        assert!(GitBackend.open(&plain).unwrap_err().is_not_found());
    }

    #[test]
    fn test_clean_tracks_working_tree() {
        let (_dir, path) = setup();
        assert!(GitBackend.is_clean(&path).unwrap());

        fs::write(path.join("a.txt"), "a").unwrap();
        assert!(!GitBackend.is_clean(&path).unwrap());

        commit_all(&path, "add a");
        assert!(GitBackend.is_clean(&path).unwrap());
    }

    #[test]
    fn test_history_is_newest_first() {
        let (_dir, path) = setup();
        assert!(GitBackend.history(&path, None).unwrap().is_empty());

        fs::write(path.join("a.txt"), "a").unwrap();
        let c1 = commit_all(&path, "first");
        fs::write(path.join("a.txt"), "b").unwrap();
        let c2 = commit_all(&path, "second");

        let history = GitBackend.history(&path, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, c2);
        assert_eq!(history[1].id, c1);
        assert_eq!(history[0].parent_ids, vec![c1]);
        assert_eq!(history[1].summary(), "first");

        assert_eq!(GitBackend.history(&path, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_stage_all_picks_up_deletions() {
        let (_dir, path) = setup();
        fs::write(path.join("a.txt"), "a").unwrap();
        commit_all(&path, "add");

        fs::remove_file(path.join("a.txt")).unwrap();
        GitBackend.stage_all(&path).unwrap();
        assert!(!GitBackend.is_clean(&path).unwrap());
        commit_all(&path, "remove");
        assert!(GitBackend.is_clean(&path).unwrap());

        let repo = Repository::open(&path).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(tree.get_name("a.txt").is_none());
    }
}
