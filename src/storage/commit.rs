//! Commit options, commit history and message formatting
//!
//! every mutation of a repository becomes one commit. The caller supplies a
//! free-text message through [`CommitOptions`]; the repository appends a
//! generated line describing what changed before committing.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use git2::{Repository, Revwalk, Sort};

use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::types::{CommitId, GitSignature};

/// per-operation commit parameters
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// free-text message supplied by the caller
    pub message: String,
    /// author identity, falls back to the database signature
    pub author: Option<GitSignature>,
    /// committer identity, falls back to the author
    pub committer: Option<GitSignature>,
}

impl CommitOptions {
    /// create options with a message and default identities
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// set the author signature
    pub fn author(mut self, author: GitSignature) -> Self {
        self.author = Some(author);
        self
    }

    /// set the committer signature
    pub fn committer(mut self, committer: GitSignature) -> Self {
        self.committer = Some(committer);
        self
    }

    /// append a generated description, separated by a blank line
    pub(crate) fn append(mut self, description: impl AsRef<str>) -> Self {
        self.message = format!("{}\n\n{}", self.message, description.as_ref());
        self
    }

    /// the message as it is committed
    pub(crate) fn trimmed_message(&self) -> &str {
        self.message.trim()
    }

    /// resolve author and committer against a fallback identity
    pub(crate) fn identities(&self, fallback: &GitSignature) -> (GitSignature, GitSignature) {
        let author = self.author.clone().unwrap_or_else(|| fallback.clone());
        let committer = self.committer.clone().unwrap_or_else(|| author.clone());
        (author, committer)
    }
}

/// information about a commit
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: CommitId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let time = commit.time();
        let timestamp = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            timestamp,
        }
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// iterate over commit history starting from a commit
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// create a new history iterator
    pub fn new(repo: &'repo Repository, start: CommitId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Ok(CommitInfo::from_git2(&commit))),
                Err(e) => Some(Err(StorageError::Git(e))),
            },
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}

/// message formatting for repository operations
pub struct CommitMessage;

impl CommitMessage {
    /// describe a file write
    pub fn wrote_file(bytes: u64, path: &Path) -> String {
        format!("wrote {} bytes to file {}", bytes, path.display())
    }

    /// describe a file removal
    pub fn removed_file(path: &Path) -> String {
        format!("removed file {}", path.display())
    }

    /// describe a metadata write
    pub fn wrote_meta(path: &Path) -> String {
        format!("wrote meta-data to {}", path.display())
    }

    /// describe a metadata removal
    pub fn removed_meta(path: &Path) -> String {
        format!("removed meta-data file {}", path.display())
    }
}
