//! Repository layer for database persistence.
//!
//! All database access goes through rusqlite with one connection per
//! operation. `DocStore` also carries the on-disk layout of the document
//! tree, so a document can find its directory from its id.

mod fsinfo;
mod history;
mod moreinfo;
mod records;
mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::checksum::Md5Hasher;
use crate::config::Settings;
use crate::error::{IoContext, Result};
use crate::models::FormatRules;

pub use fsinfo::FsInfoRow;
pub use history::{nice_size, DocAction, HistoryEntry};
pub use records::BibDocRow;

/// Handle on the document database and file tree.
#[derive(Debug, Clone)]
pub struct DocStore {
    db_path: PathBuf,
    filedir: PathBuf,
    files_per_group: i64,
    use_fsinfo_cache: bool,
    hasher: Md5Hasher,
    formats: FormatRules,
}

impl DocStore {
    /// Open the store with default tuning, creating the schema if needed.
    pub fn new(db_path: &Path, filedir: &Path) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
            filedir: filedir.to_path_buf(),
            files_per_group: 5000,
            use_fsinfo_cache: true,
            hasher: Md5Hasher::default(),
            formats: FormatRules::default(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open the store described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let db_path = settings.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }
        std::fs::create_dir_all(&settings.filedir).at(&settings.filedir)?;
        Ok(Self::new(&db_path, &settings.filedir)?
            .with_files_per_group(settings.files_per_group)
            .with_fsinfo_cache(settings.use_fsinfo_cache)
            .with_hasher(Md5Hasher::new(
                settings.md5_external_threshold,
                settings.md5_tool.as_deref(),
            ))
            .with_formats(FormatRules::new(
                &settings.additional_known_file_extensions,
                settings.strong_format_normalization,
            )))
    }

    pub fn with_files_per_group(mut self, files_per_group: i64) -> Self {
        self.files_per_group = files_per_group.max(1);
        self
    }

    pub fn with_fsinfo_cache(mut self, enabled: bool) -> Self {
        self.use_fsinfo_cache = enabled;
        self
    }

    pub fn with_hasher(mut self, hasher: Md5Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_formats(mut self, formats: FormatRules) -> Self {
        self.formats = formats;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn filedir(&self) -> &Path {
        &self.filedir
    }

    pub fn hasher(&self) -> &Md5Hasher {
        &self.hasher
    }

    pub fn formats(&self) -> &FormatRules {
        &self.formats
    }

    pub fn use_fsinfo_cache(&self) -> bool {
        self.use_fsinfo_cache
    }

    /// Directory holding the files of `docid`: `<filedir>/g<group>/<docid>`.
    pub fn doc_dir(&self, docid: i64) -> PathBuf {
        self.filedir
            .join(format!("g{}", docid / self.files_per_group))
            .join(docid.to_string())
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        schema::create_tables(&conn)
    }
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_doc_dir_groups_ids() {
        let dir = tempdir().unwrap();
        let store = DocStore::new(&dir.path().join("db.sqlite"), &dir.path().join("files"))
            .unwrap()
            .with_files_per_group(100);
        assert_eq!(store.doc_dir(42), dir.path().join("files").join("g0").join("42"));
        assert_eq!(store.doc_dir(250), dir.path().join("files").join("g2").join("250"));
    }

    #[test]
    fn test_parse_datetime() {
        let dt = parse_datetime("2024-03-01T10:00:00+00:00");
        assert_eq!(dt.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert_eq!(parse_datetime("garbage"), DateTime::UNIX_EPOCH);
    }
}
