//! A document: a named, versioned set of files in one directory.
//!
//! The directory is the source of truth. After every mutation the document
//! touches its row, refreshes the checksum index, rescans the directory and
//! rewrites the `bibdocfsinfo` cache. Differences between the old and new
//! file lists are appended to the history log.

mod files;
mod lifecycle;
mod listing;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::checksum::ChecksumIndex;
use crate::error::{BibDocFileError, IoContext, Result};
use crate::models::{versioned_file_name, BibDocFile, FileOwner, FileStat};
use crate::repository::{nice_size, DocAction, DocStore, FsInfoRow, HistoryEntry};

pub use files::FileOptions;
pub use lifecycle::DELETED_PREFIX;

/// Sidecar holding the owning record id.
pub const RECID_MARKER: &str = ".recid";
/// Sidecar holding the doctype.
pub const TYPE_MARKER: &str = ".type";

/// Why the file list is being rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildContext {
    /// First load; the fsinfo cache may be used and nothing is logged.
    Init,
    /// Like `Init` but always reads the directory.
    InitFromDisk,
    /// After a mutation; changes are logged as ADDED/DELETED.
    Update,
    /// After a rename; changes are logged as RENAMEDTO/RENAMEDFROM.
    Rename,
}

/// One document with its current file list.
#[derive(Debug, Clone)]
pub struct BibDoc {
    store: DocStore,
    id: i64,
    recid: Option<i64>,
    docname: String,
    doctype: String,
    status: String,
    creation_date: DateTime<Utc>,
    modification_date: DateTime<Utc>,
    basedir: PathBuf,
    docfiles: Vec<BibDocFile>,
}

impl BibDoc {
    /// Create a new empty document, optionally attached to `recid`.
    pub fn create(store: &DocStore, recid: Option<i64>, docname: &str, doctype: &str) -> Result<Self> {
        check_docname(docname)?;
        if let Some(recid) = recid {
            if store.docname_taken(recid, docname, None)? {
                return Err(BibDocFileError::NameCollision {
                    recid,
                    name: docname.to_string(),
                });
            }
        }
        let id = store.insert_bibdoc(docname, doctype)?;
        if let Some(recid) = recid {
            store.link_record(recid, id, doctype)?;
        }
        let basedir = store.doc_dir(id);
        if let Err(e) = fs::create_dir_all(&basedir) {
            error!("Cannot create {}: {}", basedir.display(), e);
            store.purge_bibdoc_rows(id)?;
            return Err(BibDocFileError::io(&basedir, e));
        }
        debug!("Created document {} ({}) in {}", id, docname, basedir.display());
        let doc = Self::load(store, id)?;
        doc.write_markers()?;
        Ok(doc)
    }

    /// Load an existing document.
    pub fn load(store: &DocStore, docid: i64) -> Result<Self> {
        let row = store
            .get_bibdoc_row(docid)?
            .ok_or_else(|| BibDocFileError::NotFound(format!("docid {}", docid)))?;
        let basedir = store.doc_dir(docid);
        fs::create_dir_all(&basedir).at(&basedir)?;
        let mut doc = Self {
            store: store.clone(),
            id: docid,
            recid: store.get_recid(docid)?,
            docname: row.docname,
            doctype: row.doctype,
            status: row.status,
            creation_date: row.creation_date,
            modification_date: row.modification_date,
            basedir,
            docfiles: Vec::new(),
        };
        doc.build_file_list(BuildContext::Init)?;
        Ok(doc)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn get_recid(&self) -> Option<i64> {
        self.recid
    }

    pub fn get_docname(&self) -> &str {
        &self.docname
    }

    pub fn get_type(&self) -> &str {
        &self.doctype
    }

    pub fn get_status(&self) -> &str {
        &self.status
    }

    pub fn get_base_dir(&self) -> &Path {
        &self.basedir
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn modification_date(&self) -> DateTime<Utc> {
        self.modification_date
    }

    pub fn store(&self) -> &DocStore {
        &self.store
    }

    /// Full path a (format, version) is stored at.
    pub fn get_file_path(&self, format: &str, version: i64) -> PathBuf {
        self.basedir.join(versioned_file_name(&self.docname, format, version))
    }

    fn owner(&self) -> FileOwner {
        FileOwner {
            docid: self.id,
            recid: self.recid,
            docname: self.docname.clone(),
            doctype: self.doctype.clone(),
            status: self.status.clone(),
        }
    }

    fn checksum_index(&self) -> Result<ChecksumIndex> {
        ChecksumIndex::open(&self.basedir, self.store.hasher().clone())
    }

    /// Rewrite the `.recid` and `.type` sidecars.
    pub(crate) fn write_markers(&self) -> Result<()> {
        if let Some(recid) = self.recid {
            let path = self.basedir.join(RECID_MARKER);
            fs::write(&path, recid.to_string()).at(&path)?;
        }
        let path = self.basedir.join(TYPE_MARKER);
        fs::write(&path, &self.doctype).at(&path)?;
        Ok(())
    }

    /// Rebuild the in-memory file list and log what changed.
    pub fn build_file_list(&mut self, context: BuildContext) -> Result<()> {
        let row = self
            .store
            .get_bibdoc_row(self.id)?
            .ok_or_else(|| BibDocFileError::NotFound(format!("docid {}", self.id)))?;
        self.status = row.status;
        self.creation_date = row.creation_date;
        self.modification_date = row.modification_date;

        let previous = std::mem::take(&mut self.docfiles);
        let metadata = self.store.all_file_metadata(self.id)?;
        let owner = self.owner();
        let hasher = self.store.hasher().clone();
        let mut docfiles = Vec::new();

        if self.store.use_fsinfo_cache() && context == BuildContext::Init {
            for row in self.store.fsinfo_rows(self.id)? {
                let path = self.get_file_path(&row.format, row.version);
                let stat = FileStat {
                    size: row.filesize,
                    creation_date: row.creation_date,
                    modification_date: row.modification_date,
                };
                docfiles.push(BibDocFile::new(
                    &path,
                    &owner,
                    row.version,
                    &row.format,
                    &row.checksum,
                    metadata.get(&(row.version, row.format.clone())),
                    Some(stat),
                    hasher.clone(),
                )?);
            }
        } else if self.basedir.exists() {
            let mut index = self.checksum_index()?;
            for name in list_visible_files(&self.basedir)? {
                let (parts, version) = match self.store.formats().decompose_file_with_version(&name) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Skipping {} in {}: {}", name, self.basedir.display(), e);
                        continue;
                    }
                };
                let path = self.basedir.join(&name);
                let checksum = index.get_checksum(&name)?;
                docfiles.push(BibDocFile::new(
                    &path,
                    &owner,
                    version,
                    &parts.format,
                    &checksum,
                    metadata.get(&(version, parts.format.clone())),
                    None,
                    hasher.clone(),
                )?);
            }
        }

        let latest = docfiles.iter().map(BibDocFile::get_version).max().unwrap_or(0);
        self.docfiles = docfiles
            .into_iter()
            .map(|f| {
                let is_latest = f.get_version() == latest;
                f.with_latest(is_latest)
            })
            .collect();

        if matches!(context, BuildContext::Update | BuildContext::Rename) {
            for entry in diff_file_lists(&previous, &self.docfiles, context) {
                if let Err(e) = self.store.log_action(&entry) {
                    warn!("Cannot log {} for document {}: {}", entry.action, self.id, e);
                }
            }
        }
        Ok(())
    }

    /// Rescan the directory and rewrite the `bibdocfsinfo` rows.
    pub fn sync_fsinfo_cache(&mut self) -> Result<()> {
        self.build_file_list(BuildContext::InitFromDisk)?;
        self.write_fsinfo()
    }

    fn write_fsinfo(&self) -> Result<()> {
        let latest = self.get_latest_version();
        let rows: Vec<FsInfoRow> = self
            .docfiles
            .iter()
            .map(|f| FsInfoRow {
                version: f.get_version(),
                format: f.get_format().to_string(),
                last_version: f.get_version() == latest,
                creation_date: f.creation_date(),
                modification_date: f.modification_date(),
                checksum: f.get_checksum().to_string(),
                filesize: f.get_size(),
                mime: f.get_mime().to_string(),
            })
            .collect();
        self.store.replace_fsinfo(self.id, &rows)
    }

    /// Touch, refresh checksums and rebuild; runs after every mutation.
    fn refresh(&mut self, context: BuildContext) -> Result<()> {
        self.store.touch_bibdoc(self.id)?;
        if self.basedir.exists() {
            self.checksum_index()?.update(true)?;
        }
        self.build_file_list(context)?;
        if let Err(e) = self.write_fsinfo() {
            warn!("Cannot update fsinfo cache of document {}: {}", self.id, e);
        }
        Ok(())
    }

    /// Run the post-mutation refresh whatever `outcome` was, keeping the
    /// first error.
    fn finalize<T>(&mut self, context: BuildContext, outcome: Result<T>) -> Result<T> {
        let refreshed = self.refresh(context);
        match (outcome, refreshed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(refresh_error)) => {
                error!("Cannot refresh document {} after failure: {}", self.id, refresh_error);
                Err(e)
            }
        }
    }

    /// Audit log lines for this document.
    pub fn get_history(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .history(self.id)?
            .iter()
            .map(ToString::to_string)
            .collect())
    }
}

/// Names of the non-hidden regular files in `dir`, sorted.
pub(crate) fn list_visible_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with('.') && entry.path().is_file() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Document names become file name prefixes, so `/` and the version
/// separator `;` are refused.
pub(crate) fn check_docname(docname: &str) -> Result<()> {
    if docname.is_empty() || docname.contains('/') || docname.contains(';') {
        return Err(BibDocFileError::InvalidName(docname.to_string()));
    }
    Ok(())
}

/// History entries describing the change from `old` to `new`.
///
/// Files are keyed by (name, format, version). In the rename context the
/// entries are RENAMEDTO/RENAMEDFROM and carry the current time.
pub fn diff_file_lists(old: &[BibDocFile], new: &[BibDocFile], context: BuildContext) -> Vec<HistoryEntry> {
    let key = |f: &BibDocFile| (f.get_name().to_string(), f.get_format().to_string(), f.get_version());
    let old_keys: HashMap<_, _> = old.iter().map(|f| (key(f), f)).collect();
    let new_keys: HashMap<_, _> = new.iter().map(|f| (key(f), f)).collect();
    let (added, deleted) = if context == BuildContext::Rename {
        (DocAction::RenamedTo, DocAction::RenamedFrom)
    } else {
        (DocAction::Added, DocAction::Deleted)
    };

    let entry = |file: &BibDocFile, action: DocAction| HistoryEntry {
        docid: file.get_bibdocid(),
        action,
        docname: file.get_name().to_string(),
        format: file.get_format().to_string(),
        version: file.get_version(),
        size: file.get_size(),
        checksum: file.get_checksum().to_string(),
        timestamp: if context == BuildContext::Rename {
            Utc::now()
        } else {
            file.modification_date()
        },
    };

    let mut entries: Vec<HistoryEntry> = new
        .iter()
        .filter(|f| !old_keys.contains_key(&key(f)))
        .map(|f| entry(f, added))
        .collect();
    entries.extend(
        old.iter()
            .filter(|f| !new_keys.contains_key(&key(f)))
            .map(|f| entry(f, deleted)),
    );
    entries
}

impl fmt::Display for BibDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = format!("{}:{}", self.recid.unwrap_or(0), self.id);
        writeln!(f, "{}:::doctype={}", prefix, self.doctype)?;
        writeln!(f, "{}:::name={}", prefix, self.docname)?;
        writeln!(f, "{}:::status={}", prefix, self.status)?;
        writeln!(f, "{}:::basedir={}", prefix, self.basedir.display())?;
        writeln!(f, "{}:::creation date={}", prefix, self.creation_date.to_rfc3339())?;
        writeln!(f, "{}:::modification date={}", prefix, self.modification_date.to_rfc3339())?;
        writeln!(f, "{}:::total file attached={}", prefix, self.docfiles.len())?;
        writeln!(
            f,
            "{}:::total size latest version={}",
            prefix,
            nice_size(self.get_total_size_latest_version())
        )?;
        writeln!(f, "{}:::total size all files={}", prefix, nice_size(self.get_total_size()))?;
        for docfile in &self.docfiles {
            write!(f, "{}", docfile)?;
        }
        Ok(())
    }
}
