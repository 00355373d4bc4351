//! RepoDB - a file-based record store backed by Git
//!
//! Every repository is a directory with its own Git history. Writing or
//! removing a file or a metadata record inside a repository immediately
//! commits the change, so the full history of every record is preserved.
//!
//! # Example
//!
//! ```no_run
//! use repodb::db::{CommitOptions, Database, RepoInfo};
//! use repodb::storage::FileRecord;
//!
//! let db = Database::open("./my_database");
//! let repo = db.create_repo(RepoInfo::new("notes").description("my notes")).unwrap();
//!
//! let note = FileRecord::new("hello.txt");
//! repo.write_file(&note, &b"hello"[..], CommitOptions::new("add hello")).unwrap();
//! repo.write_meta(&note, CommitOptions::new("hello metadata")).unwrap();
//! ```

pub mod db;
pub mod storage;
