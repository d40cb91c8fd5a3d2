//! Version and format queries over a document's loaded files.

use super::BibDoc;
use crate::error::{BibDocFileError, Result};
use crate::models::{get_superformat_from_format, BibDocFile};

impl BibDoc {
    /// Every file, hidden ones included.
    pub fn docfiles(&self) -> &[BibDocFile] {
        &self.docfiles
    }

    /// Distinct versions, ascending.
    pub fn list_versions(&self) -> Vec<i64> {
        let mut versions: Vec<i64> = self.docfiles.iter().map(BibDocFile::get_version).collect();
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    /// Highest version present, 0 for an empty document.
    pub fn get_latest_version(&self) -> i64 {
        self.docfiles
            .iter()
            .map(BibDocFile::get_version)
            .max()
            .unwrap_or(0)
    }

    pub fn list_all_files(&self, list_hidden: bool) -> Vec<&BibDocFile> {
        self.docfiles
            .iter()
            .filter(|f| list_hidden || !f.is_hidden())
            .collect()
    }

    pub fn list_version_files(&self, version: i64, list_hidden: bool) -> Vec<&BibDocFile> {
        self.docfiles
            .iter()
            .filter(|f| f.get_version() == version && (list_hidden || !f.is_hidden()))
            .collect()
    }

    pub fn list_latest_files(&self, list_hidden: bool) -> Vec<&BibDocFile> {
        self.list_version_files(self.get_latest_version(), list_hidden)
    }

    /// File of `format` at `version` (latest when `None`). Without `exact`,
    /// a file whose superformat matches is accepted too.
    pub fn get_file(&self, format: &str, version: Option<i64>, exact: bool) -> Result<&BibDocFile> {
        let version = version.unwrap_or_else(|| self.get_latest_version());
        let format = self.store.formats().normalize_format(format);
        let candidates: Vec<&BibDocFile> = self
            .docfiles
            .iter()
            .filter(|f| f.get_version() == version)
            .collect();

        if let Some(file) = candidates.iter().find(|f| f.get_format() == format) {
            return Ok(*file);
        }
        if !exact {
            let wanted = get_superformat_from_format(&format).to_ascii_lowercase();
            if let Some(file) = candidates
                .iter()
                .find(|f| f.get_superformat().to_ascii_lowercase() == wanted)
            {
                return Ok(*file);
            }
        }
        Err(BibDocFileError::NotFound(format!(
            "format {} at version {} of document {}",
            format, version, self.docname
        )))
    }

    /// True if some version already has `format`.
    pub fn format_already_exists_p(&self, format: &str) -> bool {
        let format = self.store.formats().normalize_format(format);
        self.docfiles.iter().any(|f| f.get_format() == format)
    }

    pub fn get_total_size(&self) -> u64 {
        self.docfiles.iter().map(BibDocFile::get_size).sum()
    }

    pub fn get_total_size_latest_version(&self) -> u64 {
        self.list_latest_files(true).iter().map(|f| f.get_size()).sum()
    }
}
