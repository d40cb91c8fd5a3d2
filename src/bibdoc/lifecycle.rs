//! Naming, status and deletion of a document.

use std::fs;

use chrono::Utc;
use tracing::{error, info, warn};

use super::{check_docname, BibDoc, BuildContext, TYPE_MARKER};
use crate::access::DELETED_STATUS;
use crate::error::{BibDocFileError, IoContext, Result};
use crate::models::{propose_next_docname, versioned_file_name};
use crate::repository::{DocAction, HistoryEntry};

/// Prefix given to soft-deleted document names.
pub const DELETED_PREFIX: &str = "DELETED-";

impl BibDoc {
    /// Set a restriction status. `DELETED` is reserved for `delete`.
    pub fn set_status(&mut self, status: &str) -> Result<()> {
        if status == DELETED_STATUS {
            return Err(BibDocFileError::ReservedStatus(status.to_string()));
        }
        let outcome = self.store.set_status(self.id, status);
        self.finalize(BuildContext::Update, outcome)
    }

    pub fn change_doctype(&mut self, doctype: &str) -> Result<()> {
        let outcome = self.store.set_doctype(self.id, doctype).and_then(|_| {
            self.doctype = doctype.to_string();
            let path = self.basedir.join(TYPE_MARKER);
            fs::write(&path, doctype).at(&path)
        });
        self.finalize(BuildContext::Update, outcome)
    }

    /// Rename the document and all of its files.
    pub fn change_name(&mut self, newname: &str) -> Result<()> {
        let outcome = self.rename_files(newname);
        self.finalize(BuildContext::Rename, outcome)
    }

    fn rename_files(&mut self, newname: &str) -> Result<()> {
        check_docname(newname)?;
        if newname == self.docname {
            return Ok(());
        }
        if let Some(recid) = self.recid {
            if self.store.docname_taken(recid, newname, Some(self.id))? {
                return Err(BibDocFileError::NameCollision {
                    recid,
                    name: newname.to_string(),
                });
            }
        }

        let mut index = self.checksum_index()?;
        for file in &self.docfiles {
            let from = file.get_file_name();
            let to = versioned_file_name(newname, file.get_format(), file.get_version());
            let (from_path, to_path) = (self.basedir.join(&from), self.basedir.join(&to));
            fs::rename(&from_path, &to_path).map_err(|e| {
                error!("Cannot rename {} to {}: {}", from_path.display(), to_path.display(), e);
                BibDocFileError::io(&from_path, e)
            })?;
            index.rename(&from, &to)?;
        }
        self.store.set_docname(self.id, newname)?;
        info!("Renamed document {} from {} to {}", self.id, self.docname, newname);
        self.docname = newname.to_string();
        Ok(())
    }

    /// Soft-delete: rename to `DELETED-<timestamp>-<name>` and mark DELETED.
    pub fn delete(&mut self) -> Result<()> {
        let now = Utc::now();
        let newname = format!(
            "{}{}{:06}-{}",
            DELETED_PREFIX,
            now.format("%Y%m%d%H%M%S"),
            now.timestamp_subsec_micros(),
            self.docname
        );
        let outcome = self
            .rename_files(&newname)
            .and_then(|_| self.store.set_status(self.id, DELETED_STATUS));
        self.finalize(BuildContext::Rename, outcome)
    }

    /// Undo `delete`, restoring the original name (or the next free one) and
    /// `previous_status`.
    pub fn undelete(&mut self, previous_status: &str) -> Result<()> {
        if previous_status == DELETED_STATUS {
            return Err(BibDocFileError::ReservedStatus(previous_status.to_string()));
        }
        if self.status != DELETED_STATUS {
            return Err(BibDocFileError::InvalidName(format!(
                "document {} is not marked as deleted",
                self.id
            )));
        }
        let original = original_docname(&self.docname)?;
        let mut candidate = original.clone();
        if let Some(recid) = self.recid {
            while self.store.docname_taken(recid, &candidate, Some(self.id))? {
                candidate = propose_next_docname(&candidate);
            }
        }
        if candidate != original {
            warn!(
                "{} is taken in record {:?}, undeleting document {} as {}",
                original, self.recid, self.id, candidate
            );
        }
        let outcome = self.rename_files(&candidate).and_then(|_| {
            if self.store.restore_status(self.id, previous_status)? {
                Ok(())
            } else {
                Err(BibDocFileError::InvalidName(format!(
                    "document {} is not marked as deleted",
                    self.id
                )))
            }
        });
        self.finalize(BuildContext::Rename, outcome)
    }

    /// Remove the document for good: its directory and every row.
    pub fn expunge(self) -> Result<()> {
        if self.basedir.exists() {
            fs::remove_dir_all(&self.basedir).map_err(|e| {
                error!("Cannot remove {}: {}", self.basedir.display(), e);
                BibDocFileError::io(&self.basedir, e)
            })?;
        }
        self.store.purge_bibdoc_rows(self.id)?;
        let entry = HistoryEntry::document(self.id, DocAction::Expunge, &self.docname);
        if let Err(e) = self.store.log_action(&entry) {
            warn!("Cannot log expunge of document {}: {}", self.id, e);
        }
        info!("Expunged document {} ({})", self.id, self.docname);
        Ok(())
    }
}

/// Name a soft-deleted document had before `delete`.
fn original_docname(deleted_name: &str) -> Result<String> {
    if !deleted_name.starts_with(DELETED_PREFIX) {
        return Err(BibDocFileError::InvalidName(format!(
            "{} is not the name of a deleted document",
            deleted_name
        )));
    }
    let original = deleted_name.splitn(3, '-').nth(2).unwrap_or_default();
    if original.is_empty() {
        return Err(BibDocFileError::InvalidName(deleted_name.to_string()));
    }
    Ok(original.to_string())
}
