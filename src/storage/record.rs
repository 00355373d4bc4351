//! Records and where they live inside a repository.
//!
//! A record is anything that can name its content file and the folder that
//! holds it. Content lives at `<repo>/<folder>/<file_name>` and metadata at
//! `<repo>/<folder>/<meta_dir>/<file_name>.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::path::{is_contained, is_single_component, sanitize};

/// A storable entity.
///
/// The `(folder, file_name)` pair should be unique within a repository;
/// two records sharing it overwrite each other.
pub trait Record {
    /// Name of the content file.
    fn file_name(&self) -> &str;

    /// Folder below the repository root. Empty means the root itself.
    fn folder(&self) -> &str;
}

/// Resolved on-disk location of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    /// `<repo>/<folder>`
    pub dir: PathBuf,
    /// `<folder>`, relative to the repository
    pub folder: PathBuf,
    /// sanitized file name
    pub file_name: String,
    /// `<folder>/<file_name>`, relative to the repository
    pub relative: PathBuf,
}

impl RecordLocation {
    /// Resolve a record against a repository directory.
    pub fn resolve<R: Record + ?Sized>(repo_dir: &Path, record: &R) -> StorageResult<Self> {
        let folder = record.folder();
        if !is_contained(folder) {
            return Err(StorageError::InvalidArgument(format!(
                "record folder escapes the repository: {folder}"
            )));
        }

        let file_name = sanitize(record.file_name());
        if !is_single_component(&file_name) {
            return Err(StorageError::InvalidArgument(format!(
                "invalid record file name: {:?}",
                record.file_name()
            )));
        }

        Ok(Self {
            dir: repo_dir.join(folder),
            folder: PathBuf::from(folder),
            relative: Path::new(folder).join(&file_name),
            file_name,
        })
    }

    /// Full path of the content file.
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// `<folder>/<meta_dir>/<file_name>.json`, relative to the repository
    pub fn meta_relative(&self, meta_dir: &str) -> PathBuf {
        self.folder
            .join(meta_dir)
            .join(format!("{}.json", self.file_name))
    }
}

/// A plain content record kept in the `files` folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    #[serde(rename = "softdeleted")]
    pub soft_deleted: bool,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    #[serde(default)]
    pub deleted_on: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Folder all file records are stored in.
    pub const FOLDER: &'static str = "files";

    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            soft_deleted: false,
            created_on: now,
            updated_on: now,
            deleted_on: None,
        }
    }

    /// mark the record as updated now
    pub fn touch(&mut self) {
        self.updated_on = Utc::now();
    }
}

impl Record for FileRecord {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn folder(&self) -> &str {
        Self::FOLDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Custom {
        name: &'static str,
        folder: &'static str,
    }

    impl Record for Custom {
        fn file_name(&self) -> &str {
            self.name
        }

        fn folder(&self) -> &str {
            self.folder
        }
    }

    #[test]
    fn test_resolve_file_record() {
        let loc = RecordLocation::resolve(Path::new("/db/HelloRepo"), &FileRecord::new("HelloWorld.txt"))
            .unwrap();
        assert_eq!(loc.dir, Path::new("/db/HelloRepo/files"));
        assert_eq!(loc.file_path(), Path::new("/db/HelloRepo/files/HelloWorld.txt"));
        assert_eq!(loc.relative, Path::new("files/HelloWorld.txt"));
        assert_eq!(
            loc.meta_relative("meta-data"),
            Path::new("files/meta-data/HelloWorld.txt.json")
        );
    }

    #[test]
    fn test_root_folder_record() {
        let rec = Custom { name: "HelloRepo", folder: "" };
        let loc = RecordLocation::resolve(Path::new("/db/HelloRepo"), &rec).unwrap();
        assert_eq!(loc.dir, Path::new("/db/HelloRepo"));
        assert_eq!(loc.meta_relative("meta-data"), Path::new("meta-data/HelloRepo.json"));
    }

    #[test]
    fn test_resolve_sanitizes_file_name() {
        let rec = Custom { name: "../../secret", folder: "docs" };
        let loc = RecordLocation::resolve(Path::new("/db/r"), &rec).unwrap();
        assert_eq!(loc.file_path(), Path::new("/db/r/docs/secret"));
    }

    #[test]
    fn test_resolve_rejects_bad_locations() {
        let escaping = Custom { name: "a", folder: "../other" };
        assert!(RecordLocation::resolve(Path::new("/db/r"), &escaping).is_err());

        let absolute = Custom { name: "a", folder: "/etc" };
        assert!(RecordLocation::resolve(Path::new("/db/r"), &absolute).is_err());

        let empty = Custom { name: "..", folder: "docs" };
        assert!(RecordLocation::resolve(Path::new("/db/r"), &empty).is_err());
    }

    #[test]
    fn test_resolve_rejects_names_that_sanitize_to_parent() {
        for name in ["./.", ".../."] {
            let rec = Custom { name, folder: "docs" };
            let err = RecordLocation::resolve(Path::new("/db/r"), &rec).unwrap_err();
            assert!(matches!(err, StorageError::InvalidArgument(_)), "{name:?}: {err}");
        }
    }

    #[test]
    fn test_file_record_json_shape() {
        let rec = FileRecord::new("a.txt");
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["name"], "a.txt");
        assert_eq!(value["softdeleted"], false);

        let back: FileRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, rec);
    }
}
