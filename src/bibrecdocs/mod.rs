//! The documents attached to one record.
//!
//! Lookups go through the database so that every mutation works on a freshly
//! loaded `BibDoc`; the cached list is rebuilt afterwards.

mod repair;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use crate::bibdoc::{BibDoc, FileOptions};
use crate::error::{BibDocFileError, Result};
use crate::models::{propose_next_docname, BibDocFile};
use crate::repository::{nice_size, DocStore};

pub use repair::FixReport;

/// Documents of a record ordered by name.
#[derive(Debug, Clone)]
pub struct BibRecDocs {
    store: DocStore,
    recid: i64,
    deleted_too: bool,
    bibdocs: Vec<BibDoc>,
}

impl BibRecDocs {
    /// Load the documents of `recid`; soft-deleted ones only with `deleted_too`.
    pub fn new(store: &DocStore, recid: i64, deleted_too: bool) -> Result<Self> {
        let mut recdocs = Self {
            store: store.clone(),
            recid,
            deleted_too,
            bibdocs: Vec::new(),
        };
        recdocs.build_bibdoc_list()?;
        Ok(recdocs)
    }

    pub fn build_bibdoc_list(&mut self) -> Result<()> {
        self.bibdocs = self
            .store
            .record_docids(self.recid, self.deleted_too)?
            .into_iter()
            .map(|docid| BibDoc::load(&self.store, docid))
            .collect::<Result<Vec<_>>>()?;
        debug!("Record {} has {} documents", self.recid, self.bibdocs.len());
        Ok(())
    }

    pub fn recid(&self) -> i64 {
        self.recid
    }

    pub fn bibdocs(&self) -> &[BibDoc] {
        &self.bibdocs
    }

    pub fn empty_p(&self) -> bool {
        self.bibdocs.is_empty()
    }

    pub fn list_bibdocs(&self, doctype: Option<&str>) -> Vec<&BibDoc> {
        self.bibdocs
            .iter()
            .filter(|doc| doctype.map_or(true, |t| doc.get_type() == t))
            .collect()
    }

    pub fn list_bibdocs_by_names(&self, doctype: Option<&str>) -> BTreeMap<String, &BibDoc> {
        self.list_bibdocs(doctype)
            .into_iter()
            .map(|doc| (doc.get_docname().to_string(), doc))
            .collect()
    }

    pub fn get_bibdoc_names(&self, doctype: Option<&str>) -> Vec<String> {
        self.list_bibdocs(doctype)
            .into_iter()
            .map(|doc| doc.get_docname().to_string())
            .collect()
    }

    pub fn has_docname_p(&self, docname: &str) -> Result<bool> {
        Ok(self.store.find_docid(self.recid, docname)?.is_some())
    }

    pub fn get_docid(&self, docname: &str) -> Result<i64> {
        self.store.find_docid(self.recid, docname)?.ok_or_else(|| {
            BibDocFileError::NotFound(format!("document {} of record {}", docname, self.recid))
        })
    }

    pub fn get_docname(&self, docid: i64) -> Result<String> {
        match self.store.get_bibdoc_row(docid)? {
            Some(row) if self.store.get_recid(docid)? == Some(self.recid) => Ok(row.docname),
            _ => Err(BibDocFileError::NotFound(format!(
                "docid {} in record {}",
                docid, self.recid
            ))),
        }
    }

    /// Freshly loaded document called `docname`.
    pub fn get_bibdoc(&self, docname: &str) -> Result<BibDoc> {
        BibDoc::load(&self.store, self.get_docid(docname)?)
    }

    /// `docname`, or the first of `docname_1`, `docname_2`, ... not yet used.
    pub fn propose_unique_docname(&self, docname: &str) -> Result<String> {
        let mut candidate = docname.to_string();
        while self.store.docname_taken(self.recid, &candidate, None)? {
            candidate = propose_next_docname(&candidate);
        }
        Ok(candidate)
    }

    /// Create an empty document. With `never_fail` a taken name is suffixed.
    pub fn add_bibdoc(&mut self, doctype: &str, docname: &str, never_fail: bool) -> Result<BibDoc> {
        let docname = if never_fail {
            self.propose_unique_docname(docname)?
        } else {
            docname.to_string()
        };
        if self.has_docname_p(&docname)? {
            return Err(BibDocFileError::NameCollision {
                recid: self.recid,
                name: docname,
            });
        }
        let doc = BibDoc::create(&self.store, Some(self.recid), &docname, doctype)?;
        info!("Added document {} ({}) to record {}", doc.id(), docname, self.recid);
        self.build_bibdoc_list()?;
        Ok(doc)
    }

    fn docname_for(&self, path: &Path, docname: Option<&str>) -> String {
        match docname {
            Some(name) => name.to_string(),
            None => {
                self.store
                    .formats()
                    .decompose_file(&path.to_string_lossy(), false, false)
                    .base
            }
        }
    }

    /// Add `path` to the document called `docname` (derived from the file
    /// name when `None`), creating it if needed. An existing format fails
    /// unless `never_fail`, which moves the file into a new sibling document.
    pub fn add_new_file(
        &mut self,
        path: &Path,
        doctype: &str,
        docname: Option<&str>,
        never_fail: bool,
        options: &FileOptions,
    ) -> Result<BibDoc> {
        let docname = self.docname_for(path, docname);
        let doc = match self.get_bibdoc(&docname) {
            Ok(mut doc) => match doc.add_file_new_format(path, None, options) {
                Ok(_) => doc,
                Err(BibDocFileError::FormatExists { .. }) if never_fail => {
                    let mut sibling = self.add_bibdoc(doctype, &docname, true)?;
                    sibling.add_file_new_version(path, options)?;
                    sibling
                }
                Err(e) => return Err(e),
            },
            Err(e) if e.is_not_found() => {
                let mut doc = self.add_bibdoc(doctype, &docname, false)?;
                doc.add_file_new_version(path, options)?;
                doc
            }
            Err(e) => return Err(e),
        };
        self.build_bibdoc_list()?;
        Ok(doc)
    }

    /// Add `path` as a new version of an existing document.
    pub fn add_new_version(&mut self, path: &Path, docname: Option<&str>, options: &FileOptions) -> Result<BibDoc> {
        let docname = self.docname_for(path, docname);
        let mut doc = self.get_bibdoc(&docname)?;
        doc.add_file_new_version(path, options)?;
        self.build_bibdoc_list()?;
        Ok(doc)
    }

    /// Add `path` as a new format of the latest version of a document.
    pub fn add_new_format(&mut self, path: &Path, docname: Option<&str>, options: &FileOptions) -> Result<BibDoc> {
        let docname = self.docname_for(path, docname);
        let mut doc = self.get_bibdoc(&docname)?;
        doc.add_file_new_format(path, None, options)?;
        self.build_bibdoc_list()?;
        Ok(doc)
    }

    /// Copy the latest formats of `docname2` into `docname1` and delete
    /// `docname2`. Nothing changes if any of those formats already exists
    /// in `docname1`.
    pub fn merge_bibdocs(&mut self, docname1: &str, docname2: &str) -> Result<()> {
        let mut doc1 = self.get_bibdoc(docname1)?;
        let mut doc2 = self.get_bibdoc(docname2)?;

        let incoming: Vec<BibDocFile> = doc2.list_latest_files(true).into_iter().cloned().collect();
        if let Some(clash) = incoming.iter().find(|f| doc1.format_already_exists_p(f.get_format())) {
            return Err(BibDocFileError::FormatExists {
                docid: doc1.id(),
                format: clash.get_format().to_string(),
                version: clash.get_version(),
            });
        }

        if !doc2.get_status().is_empty() && doc1.get_status().is_empty() {
            doc1.set_status(doc2.get_status())?;
        }
        for file in &incoming {
            let options = FileOptions {
                description: file.get_description().map(str::to_string),
                comment: file.get_comment().map(str::to_string),
                format: Some(file.get_format().to_string()),
                ..FileOptions::default()
            };
            doc1.add_file_new_format(file.get_full_path(), None, &options)?;
        }
        doc2.delete()?;
        info!(
            "Merged {} into {} in record {}",
            docname2, docname1, self.recid
        );
        self.build_bibdoc_list()
    }

    pub fn change_name(&mut self, newname: &str, oldname: &str) -> Result<()> {
        self.get_bibdoc(oldname)?.change_name(newname)?;
        self.build_bibdoc_list()
    }

    /// Soft-delete the document called `docname`.
    pub fn delete_bibdoc(&mut self, docname: &str) -> Result<()> {
        self.get_bibdoc(docname)?.delete()?;
        self.build_bibdoc_list()
    }

    pub fn list_latest_files(&self, doctype: Option<&str>, list_hidden: bool) -> Vec<&BibDocFile> {
        self.list_bibdocs(doctype)
            .into_iter()
            .flat_map(|doc| doc.list_latest_files(list_hidden))
            .collect()
    }

    pub fn get_total_size(&self) -> u64 {
        self.bibdocs.iter().map(BibDoc::get_total_size).sum()
    }

    pub fn get_total_size_latest_version(&self) -> u64 {
        self.bibdocs.iter().map(BibDoc::get_total_size_latest_version).sum()
    }

    /// True if some latest file of `format` has the same content as `path`.
    pub fn check_file_exists(&self, path: &Path, format: &str) -> Result<bool> {
        let format = self.store.formats().normalize_format(format);
        for file in self.list_latest_files(None, true) {
            if file.is_identical_to(path, &format)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl fmt::Display for BibRecDocs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}::::total bibdocs attached={}", self.recid, self.bibdocs.len())?;
        writeln!(
            f,
            "{}::::total size latest version={}",
            self.recid,
            nice_size(self.get_total_size_latest_version())
        )?;
        writeln!(f, "{}::::total size all files={}", self.recid, nice_size(self.get_total_size()))?;
        for doc in &self.bibdocs {
            write!(f, "{}", doc)?;
        }
        Ok(())
    }
}
