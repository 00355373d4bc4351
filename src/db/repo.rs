//! Repositories: one Git working tree per repository under the database root.
//!
//! Every mutating call changes the working tree and then commits everything,
//! so each write, removal or metadata update is one commit in the
//! repository's history. A commit failure does not roll back the file
//! operation; the change stays in the working tree and is picked up by the
//! next successful commit.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::api::DatabaseInner;
use crate::storage::{
    CommitId, CommitInfo, CommitMessage, CommitOptions, Record, RecordLocation, RepoName,
    StorageError, StorageResult,
};

/// Self-describing metadata of a repository.
///
/// This is also the record stored at `<repo>/meta-data/<name>.json`; its
/// folder is the repository root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub description: String,
    pub protected: bool,
    #[serde(rename = "softdeleted")]
    pub soft_deleted: bool,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    #[serde(default)]
    pub deleted_on: Option<DateTime<Utc>>,
}

impl RepoInfo {
    /// Describe a new repository. Timestamps are set to now.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: String::new(),
            protected: false,
            soft_deleted: false,
            created_on: now,
            updated_on: now,
            deleted_on: None,
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the protected flag.
    pub fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }
}

impl Record for RepoInfo {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn folder(&self) -> &str {
        ""
    }
}

/// A version-controlled directory under the database root.
///
/// The lock is per instance. Two `Repository` values opened separately for
/// the same directory do not coordinate; share one instance (it is `Sync`)
/// when several threads write to the same repository.
pub struct Repository {
    db: Arc<DatabaseInner>,
    name: RepoName,
    dir: PathBuf,
    state: RwLock<RepoInfo>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .finish()
    }
}

impl Repository {
    pub(crate) fn new(db: Arc<DatabaseInner>, name: RepoName, mut info: RepoInfo) -> Self {
        info.name = name.as_str().to_string();
        let dir: PathBuf = db.config.root.join(name.as_str()).components().collect();
        Self {
            db,
            name,
            dir,
            state: RwLock::new(info),
        }
    }

    /// Load the self-metadata of the repository named `name`.
    pub(crate) fn load(db: Arc<DatabaseInner>, name: RepoName) -> StorageResult<Self> {
        let repo = Self::new(db, name.clone(), RepoInfo::new(name.as_str()));
        repo.db.vcs.open(&repo.dir)?;

        let mut info: RepoInfo = repo.read_meta_value(&*repo.state.read())?;
        info.name = name.into_string();
        *repo.state.write() = info;
        Ok(repo)
    }

    /// Sanitized repository name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// `<database root>/<name>`
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot of the repository metadata.
    pub fn info(&self) -> RepoInfo {
        self.state.read().clone()
    }

    /// Whether removal of this repository is refused.
    pub fn is_protected(&self) -> bool {
        self.state.read().protected
    }

    /// Mark the repository as protected against removal.
    pub fn protect(&self) -> StorageResult<()> {
        self.update_info(|info| info.protected = true)
    }

    /// Clear the protected flag.
    pub fn unprotect(&self) -> StorageResult<()> {
        self.update_info(|info| info.protected = false)
    }

    /// Flag the repository as deleted without touching its content.
    pub fn soft_delete(&self) -> StorageResult<()> {
        self.update_info(|info| {
            info.soft_deleted = true;
            info.deleted_on = Some(Utc::now());
        })
    }

    /// Commit history, newest first.
    pub fn history(&self, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        let _guard = self.state.read();
        self.db.vcs.history(&self.dir, limit)
    }

    /// Stage every change and commit it.
    ///
    /// Returns `None` without committing when the working tree is clean.
    pub fn commit_all(&self, opts: CommitOptions) -> StorageResult<Option<CommitId>> {
        let _guard = self.state.write();
        self.commit_all_locked(opts)
    }

    /// Check whether the record's content file exists.
    ///
    /// Any failure to stat the file counts as absent; use
    /// [`try_file_exists`](Self::try_file_exists) to tell them apart.
    pub fn file_exists<R: Record + ?Sized>(&self, record: &R) -> bool {
        self.try_file_exists(record).unwrap_or(false)
    }

    /// Check whether the record's content file exists, surfacing stat errors.
    pub fn try_file_exists<R: Record + ?Sized>(&self, record: &R) -> StorageResult<bool> {
        let _guard = self.state.read();
        let path = RecordLocation::resolve(&self.dir, record)?.file_path();
        match fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io("stat file", path, e)),
        }
    }

    /// Write the record's content from `content` and commit it.
    ///
    /// The record's folder is created if missing and an existing file is
    /// truncated.
    pub fn write_file<R, C>(&self, record: &R, mut content: C, opts: CommitOptions) -> StorageResult<()>
    where
        R: Record + ?Sized,
        C: Read,
    {
        let _guard = self.state.write();
        let loc = RecordLocation::resolve(&self.dir, record)?;

        fs::create_dir_all(&loc.dir).map_err(|e| StorageError::io("create directory", &loc.dir, e))?;

        let path = loc.file_path();
        let written = {
            let mut file = File::create(&path).map_err(|e| StorageError::io("create file", &path, e))?;
            let written = io::copy(&mut content, &mut file)
                .map_err(|e| StorageError::io("copy content", &path, e))?;
            file.flush().map_err(|e| StorageError::io("flush file", &path, e))?;
            written
        };

        let opts = opts.append(CommitMessage::wrote_file(written, &loc.relative));
        self.commit_all_locked(opts)?;
        Ok(())
    }

    /// Copy the record's content into `dest`, returning the bytes copied.
    pub fn read_file<R, W>(&self, record: &R, mut dest: W) -> StorageResult<u64>
    where
        R: Record + ?Sized,
        W: Write,
    {
        let _guard = self.state.read();
        let path = RecordLocation::resolve(&self.dir, record)?.file_path();

        let mut file = File::open(&path).map_err(|e| StorageError::io("open file", &path, e))?;
        io::copy(&mut file, &mut dest).map_err(|e| StorageError::io("read file", &path, e))
    }

    /// Delete the record's content file and commit the removal.
    ///
    /// The record's metadata is left alone; see [`remove_meta`](Self::remove_meta).
    pub fn remove_file<R: Record + ?Sized>(&self, record: &R, opts: CommitOptions) -> StorageResult<()> {
        let _guard = self.state.write();
        let loc = RecordLocation::resolve(&self.dir, record)?;

        let path = loc.file_path();
        fs::remove_file(&path).map_err(|e| StorageError::io("remove file", &path, e))?;

        let opts = opts.append(CommitMessage::removed_file(&loc.relative));
        self.commit_all_locked(opts)?;
        Ok(())
    }

    /// Serialize the record into its metadata file and commit it.
    pub fn write_meta<R>(&self, record: &R, opts: CommitOptions) -> StorageResult<()>
    where
        R: Record + Serialize + ?Sized,
    {
        let _guard = self.state.write();
        self.write_meta_locked(record, opts)
    }

    /// Replace `record` with the contents of its metadata file.
    pub fn load_meta<R>(&self, record: &mut R) -> StorageResult<()>
    where
        R: Record + DeserializeOwned,
    {
        let _guard = self.state.read();
        *record = self.read_meta_value(&*record)?;
        Ok(())
    }

    /// Delete the record's metadata file and commit the removal.
    ///
    /// The record's content file is left alone; see [`remove_file`](Self::remove_file).
    pub fn remove_meta<R: Record + ?Sized>(&self, record: &R, opts: CommitOptions) -> StorageResult<()> {
        let _guard = self.state.write();
        let loc = RecordLocation::resolve(&self.dir, record)?;
        let meta_dir = &self.db.config.meta_dir;

        self.db.meta.remove(&loc.dir, meta_dir, &loc.file_name)?;

        let opts = opts.append(CommitMessage::removed_meta(&loc.meta_relative(meta_dir)));
        self.commit_all_locked(opts)?;
        Ok(())
    }

    /// Persist the repository's own metadata with the database identity.
    pub(crate) fn save_info(&self) -> StorageResult<()> {
        let info = self.state.write();
        self.write_meta_locked(&*info, self.db.system_commit())
    }

    /// Apply a change to the metadata, persist it, and only then keep it.
    fn update_info(&self, change: impl FnOnce(&mut RepoInfo)) -> StorageResult<()> {
        let mut info = self.state.write();
        let mut next = info.clone();
        change(&mut next);
        next.updated_on = Utc::now();

        self.write_meta_locked(&next, self.db.system_commit())?;
        *info = next;
        Ok(())
    }

    fn commit_all_locked(&self, opts: CommitOptions) -> StorageResult<Option<CommitId>> {
        let vcs = &self.db.vcs;
        vcs.stage_all(&self.dir)?;
        if vcs.is_clean(&self.dir)? {
            tracing::trace!(repo = %self.name, "nothing to commit");
            return Ok(None);
        }

        let (author, committer) = opts.identities(&self.db.config.signature);
        let id = vcs.commit(&self.dir, opts.trimmed_message(), &author, &committer)?;
        Ok(Some(id))
    }

    fn write_meta_locked<R>(&self, record: &R, opts: CommitOptions) -> StorageResult<()>
    where
        R: Record + Serialize + ?Sized,
    {
        let loc = RecordLocation::resolve(&self.dir, record)?;
        let meta_dir = &self.db.config.meta_dir;

        let value = serde_json::to_value(record).map_err(|source| StorageError::Encode {
            key: loc.file_name.clone(),
            source,
        })?;
        self.db.meta.write(&loc.dir, meta_dir, &loc.file_name, &value)?;

        let opts = opts.append(CommitMessage::wrote_meta(&loc.meta_relative(meta_dir)));
        self.commit_all_locked(opts)?;
        Ok(())
    }

    fn read_meta_value<R, T>(&self, record: &R) -> StorageResult<T>
    where
        R: Record + ?Sized,
        T: DeserializeOwned,
    {
        let loc = RecordLocation::resolve(&self.dir, record)?;
        let meta_dir = &self.db.config.meta_dir;

        let value = self.db.meta.read(&loc.dir, meta_dir, &loc.file_name)?;
        serde_json::from_value(value).map_err(|source| StorageError::Decode {
            path: self.db.meta.path(&loc.dir, meta_dir, &loc.file_name),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::storage::{ErrorKind, FileRecord, GitSignature};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database, Repository) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path());
        let repo = db.create_repo(RepoInfo::new("TestRepo")).unwrap();
        (dir, db, repo)
    }

    fn commit_count(repo: &Repository) -> usize {
        repo.history(None).unwrap().len()
    }

    #[test]
    fn test_dir_is_root_join_name() {
        let (dir, _db, repo) = setup();
        assert_eq!(repo.dir(), dir.path().join("TestRepo"));
        assert_eq!(repo.name(), "TestRepo");
    }

    #[test]
    fn test_write_then_read_round_trips() {
        let (_dir, _db, repo) = setup();
        let rec = FileRecord::new("blob.bin");
        let body: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        repo.write_file(&rec, body.as_slice(), CommitOptions::new("add blob"))
            .unwrap();

        let mut out = Vec::new();
        let n = repo.read_file(&rec, &mut out).unwrap();
        assert_eq!(n, body.len() as u64);
        assert_eq!(out, body);
        assert!(repo.file_exists(&rec));
    }

    #[test]
    fn test_write_file_overwrites() {
        let (_dir, _db, repo) = setup();
        let rec = FileRecord::new("a.txt");
        repo.write_file(&rec, &b"a much longer body"[..], CommitOptions::new("v1"))
            .unwrap();
        repo.write_file(&rec, &b"short"[..], CommitOptions::new("v2"))
            .unwrap();

        let mut out = Vec::new();
        repo.read_file(&rec, &mut out).unwrap();
        assert_eq!(out, b"short");
        assert_eq!(commit_count(&repo), 3);
    }

    #[test]
    fn test_write_file_commit_message() {
        let (_dir, _db, repo) = setup();
        let rec = FileRecord::new("a.txt");
        let alice = GitSignature::new("Alice", "alice@example.com");

        repo.write_file(&rec, &b"abc"[..], CommitOptions::new("add a").author(alice))
            .unwrap();

        let head = &repo.history(Some(1)).unwrap()[0];
        assert_eq!(head.message, "add a\n\nwrote 3 bytes to file files/a.txt");
        assert_eq!(head.author_name, "Alice");
        assert_eq!(head.author_email, "alice@example.com");
    }

    #[test]
    fn test_commit_all_twice_is_noop() {
        let (_dir, _db, repo) = setup();
        fs::write(repo.dir().join("loose.txt"), "x").unwrap();

        let first = repo.commit_all(CommitOptions::new("loose")).unwrap();
        assert!(first.is_some());
        let second = repo.commit_all(CommitOptions::new("loose again")).unwrap();
        assert!(second.is_none());

        // self-metadata + one commit
        assert_eq!(commit_count(&repo), 2);
    }

    #[test]
    fn test_remove_missing_file_does_not_commit() {
        let (_dir, _db, repo) = setup();
        let before = commit_count(&repo);

        let err = repo
            .remove_file(&FileRecord::new("ghost.txt"), CommitOptions::new("rm"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(commit_count(&repo), before);
    }

    #[test]
    fn test_remove_file_keeps_meta() {
        let (_dir, _db, repo) = setup();
        let rec = FileRecord::new("a.txt");
        repo.write_file(&rec, &b"a"[..], CommitOptions::new("add")).unwrap();
        repo.write_meta(&rec, CommitOptions::new("meta")).unwrap();

        repo.remove_file(&rec, CommitOptions::new("rm")).unwrap();
        assert!(!repo.file_exists(&rec));
        assert!(!repo.try_file_exists(&rec).unwrap());

        let mut loaded = FileRecord::new("a.txt");
        repo.load_meta(&mut loaded).unwrap();
        assert_eq!(loaded, rec);

        let head = &repo.history(Some(1)).unwrap()[0];
        assert!(head.message.ends_with("removed file files/a.txt"));
    }

    #[test]
    fn test_file_exists_when_folder_is_a_file() {
        let (_dir, _db, repo) = setup();
        fs::write(repo.dir().join(FileRecord::FOLDER), "not a folder").unwrap();
        let rec = FileRecord::new("a.txt");

        let err = repo.try_file_exists(&rec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!err.is_not_found());
        assert!(!repo.file_exists(&rec));
    }

    #[test]
    fn test_read_missing_file() {
        let (_dir, _db, repo) = setup();
        let err = repo
            .read_file(&FileRecord::new("ghost.txt"), io::sink())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_meta_round_trip_and_removal() {
        let (_dir, _db, repo) = setup();
        let rec = FileRecord::new("doc.md");
        repo.write_meta(&rec, CommitOptions::new("meta")).unwrap();
        assert!(repo.dir().join("files/meta-data/doc.md.json").is_file());

        let mut loaded = FileRecord::new("doc.md");
        loaded.soft_deleted = true;
        repo.load_meta(&mut loaded).unwrap();
        assert_eq!(loaded, rec);

        repo.remove_meta(&rec, CommitOptions::new("drop meta")).unwrap();
        assert!(!repo.dir().join("files/meta-data/doc.md.json").exists());
        let err = repo.load_meta(&mut loaded).unwrap_err();
        assert!(err.is_not_found());

        let err = repo
            .remove_meta(&rec, CommitOptions::new("again"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_load_corrupt_meta() {
        let (_dir, _db, repo) = setup();
        let meta_dir = repo.dir().join("files/meta-data");
        fs::create_dir_all(&meta_dir).unwrap();
        fs::write(meta_dir.join("bad.txt.json"), r#"{"name": 42}"#).unwrap();

        let mut rec = FileRecord::new("bad.txt");
        let err = repo.load_meta(&mut rec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_remove_self_meta_uses_repo_root() {
        let (_dir, db, repo) = setup();
        let info = repo.info();
        repo.remove_meta(&info, CommitOptions::new("drop self"))
            .unwrap();
        assert!(!repo.dir().join("meta-data/TestRepo.json").exists());

        // the directory is still a repository, but no longer loadable
        let err = db.open_repo("TestRepo").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_protect_persists() {
        let (_dir, db, repo) = setup();
        repo.protect().unwrap();
        assert!(repo.is_protected());
        assert!(db.open_repo("TestRepo").unwrap().is_protected());

        repo.unprotect().unwrap();
        assert!(!db.open_repo("TestRepo").unwrap().is_protected());
    }

    #[test]
    fn test_soft_delete_persists() {
        let (_dir, db, repo) = setup();
        repo.soft_delete().unwrap();

        let info = db.open_repo("TestRepo").unwrap().info();
        assert!(info.soft_deleted);
        assert!(info.deleted_on.is_some());
        // content is untouched
        assert!(repo.dir().join("meta-data/TestRepo.json").is_file());
    }

    #[test]
    fn test_record_outside_repo_rejected() {
        struct Escaping;
        impl Record for Escaping {
            fn file_name(&self) -> &str {
                "passwd"
            }
            fn folder(&self) -> &str {
                "../../etc"
            }
        }

        let (_dir, _db, repo) = setup();
        let err = repo
            .write_file(&Escaping, &b"x"[..], CommitOptions::new("nope"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!repo.file_exists(&Escaping));
    }

    #[test]
    fn test_concurrent_writes_through_shared_instance() {
        let (_dir, _db, repo) = setup();
        let repo = Arc::new(repo);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || {
                    let rec = FileRecord::new(format!("file{i}.txt"));
                    repo.write_file(&rec, format!("body {i}").as_bytes(), CommitOptions::new("concurrent"))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(commit_count(&repo), 5);
        for i in 0..4 {
            let mut out = Vec::new();
            repo.read_file(&FileRecord::new(format!("file{i}.txt")), &mut out)
                .unwrap();
            assert_eq!(out, format!("body {i}").as_bytes());
        }
    }
}
