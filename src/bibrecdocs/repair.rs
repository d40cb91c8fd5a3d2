//! Repair of documents whose files or names drifted from the conventions.

use std::collections::{BTreeMap, HashSet};
use std::fs;

use tracing::{info, warn};

use super::BibRecDocs;
use crate::bibdoc::{list_visible_files, BibDoc, BuildContext, FileOptions};
use crate::checksum::ChecksumIndex;
use crate::error::{BibDocFileError, IoContext, Result};
use crate::models::versioned_file_name;

/// Outcome of [`BibRecDocs::fix`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixReport {
    /// Versions found on disk, after any shift away from version 0.
    pub versions: Vec<i64>,
    /// Names of the sibling documents that received colliding files.
    pub siblings: Vec<String>,
}

/// A file parked under a temporary `FIXING-` name.
struct ParkedFile {
    parked: String,
    version: i64,
    format: String,
}

impl BibRecDocs {
    /// Regroup the files of `docname` under the current extension rules.
    ///
    /// Files that would collide on (format, version) are moved into new
    /// sibling documents. A version 0 shifts every version up by one.
    pub fn fix(&mut self, docname: &str) -> Result<FixReport> {
        let mut doc = self.get_bibdoc(docname)?;
        let basedir = doc.get_base_dir().to_path_buf();
        let formats = self.store.formats().clone();

        let mut parsed = Vec::new();
        for filename in list_visible_files(&basedir)? {
            let (name_part, version) = filename
                .rsplit_once(';')
                .and_then(|(name, v)| v.parse::<i64>().ok().map(|v| (name.to_string(), v)))
                .ok_or_else(|| {
                    BibDocFileError::InvalidName(format!(
                        "{} in {} has no integer version",
                        filename,
                        basedir.display()
                    ))
                })?;
            let stripped_len = formats.file_strip_ext(&name_part, false).len();
            let format = formats.normalize_format(&name_part[stripped_len..]);
            parsed.push((filename, name_part, version, format));
        }

        let zero_version = parsed.iter().any(|(_, _, version, _)| *version == 0);
        let shift = i64::from(zero_version);
        let mut kept: BTreeMap<i64, BTreeMap<String, String>> = BTreeMap::new();
        let mut colliding = Vec::new();
        for (counter, (filename, name_part, version, format)) in parsed.into_iter().enumerate() {
            let parked = format!("FIXING-{}-{}", counter, name_part);
            fs::rename(basedir.join(&filename), basedir.join(&parked)).at(&basedir.join(&filename))?;
            let slot = kept.entry(version + shift).or_default();
            if slot.contains_key(&format) {
                colliding.push(ParkedFile {
                    parked,
                    version: version + shift,
                    format,
                });
            } else {
                slot.insert(format, parked);
            }
        }

        if kept.is_empty() {
            info!("Document {} has no files left, deleting it", docname);
            doc.build_file_list(BuildContext::InitFromDisk)?;
            doc.delete()?;
            self.build_bibdoc_list()?;
            return Ok(FixReport::default());
        }

        for (version, files) in &kept {
            for (format, parked) in files {
                let target = basedir.join(versioned_file_name(docname, format, *version));
                fs::rename(basedir.join(parked), &target).at(&target)?;
            }
        }
        doc.write_markers()?;

        let mut report = FixReport {
            versions: kept.keys().copied().collect(),
            siblings: Vec::new(),
        };
        for file in colliding {
            let source = basedir.join(&file.parked);
            let mut sibling = self.add_bibdoc(doc.get_type(), docname, true)?;
            let options = FileOptions {
                format: Some(file.format.clone()),
                ..FileOptions::default()
            };
            sibling.add_file_new_format(&source, Some(file.version), &options)?;
            fs::remove_file(&source).at(&source)?;
            warn!(
                "Moved colliding {} version {} of {} into {}",
                file.format,
                file.version,
                docname,
                sibling.get_docname()
            );
            report.siblings.push(sibling.get_docname().to_string());
        }

        if zero_version {
            self.store.shift_metadata_versions(doc.id(), 1)?;
        }
        ChecksumIndex::open(&basedir, self.store.hasher().clone())?.update(false)?;
        self.store.touch_bibdoc(doc.id())?;
        doc.build_file_list(BuildContext::Update)?;
        doc.sync_fsinfo_cache()?;
        self.build_bibdoc_list()?;
        Ok(report)
    }

    /// True if `docname` is canonical and all its files follow
    /// `<docname><format>;<version>`.
    pub fn check_format(&self, docname: &str) -> Result<bool> {
        let doc = self.get_bibdoc(docname)?;
        if self.canonical_docname(docname) != docname {
            return Ok(false);
        }
        for filename in list_visible_files(doc.get_base_dir())? {
            let (parts, version) = self.store.formats().decompose_file_with_version(&filename)?;
            if versioned_file_name(docname, &parts.format, version) != filename {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn check_duplicate_docnames(&self) -> Result<bool> {
        Ok(self.store.duplicate_docnames(self.recid)?.is_empty())
    }

    /// Rename every parseable file of `docname` to the canonical pattern.
    pub fn uniformize_bibdoc(&mut self, docname: &str) -> Result<()> {
        let doc = self.get_bibdoc(docname)?;
        let basedir = doc.get_base_dir();
        for filename in list_visible_files(basedir)? {
            let (parts, version) = match self.store.formats().decompose_file_with_version(&filename) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Leaving {} in {} alone: {}", filename, basedir.display(), e);
                    continue;
                }
            };
            let wanted = versioned_file_name(docname, &parts.format, version);
            if wanted != filename {
                fs::rename(basedir.join(&filename), basedir.join(&wanted)).at(&basedir.join(&filename))?;
            }
        }
        ChecksumIndex::open(basedir, self.store.hasher().clone())?.update(true)?;

        let mut doc = BibDoc::load(&self.store, doc.id())?;
        self.store.touch_bibdoc(doc.id())?;
        doc.build_file_list(BuildContext::Rename)?;
        doc.sync_fsinfo_cache()?;
        self.build_bibdoc_list()
    }

    /// Give `docname` its canonical name, merging into an existing document
    /// of that name. Returns false if the merge was refused.
    pub fn fix_format(&mut self, docname: &str, skip_check: bool) -> Result<bool> {
        if !skip_check && self.check_format(docname)? {
            return Ok(true);
        }
        let docid = self.get_docid(docname)?;
        let canonical = self.canonical_docname(docname);

        if canonical == docname {
            self.uniformize_bibdoc(docname)?;
        } else if self.has_docname_p(&canonical)? {
            let proposed = self.propose_unique_docname(&canonical)?;
            self.store.set_docname(docid, &proposed)?;
            self.uniformize_bibdoc(&proposed)?;
            if let Err(e) = self.merge_bibdocs(&canonical, &proposed) {
                warn!(
                    "Cannot merge {} into {} in record {}: {}",
                    proposed, canonical, self.recid, e
                );
                self.build_bibdoc_list()?;
                return Ok(false);
            }
        } else {
            self.store.set_docname(docid, &canonical)?;
            self.uniformize_bibdoc(&canonical)?;
        }
        self.build_bibdoc_list()?;
        Ok(true)
    }

    /// Rename and merge documents sharing a name. Returns false if some
    /// merge was refused; the renamed document is then left in place.
    pub fn fix_duplicate_docnames(&mut self, skip_check: bool) -> Result<bool> {
        if !skip_check && self.check_duplicate_docnames()? {
            return Ok(true);
        }
        let mut seen = HashSet::new();
        let mut merged_all = true;
        for docid in self.store.record_docids(self.recid, false)? {
            let mut doc = BibDoc::load(&self.store, docid)?;
            let docname = doc.get_docname().to_string();
            if seen.insert(docname.clone()) {
                continue;
            }
            let proposed = self.propose_unique_docname(&docname)?;
            doc.change_name(&proposed)?;
            if let Err(e) = self.merge_bibdocs(&docname, &proposed) {
                warn!(
                    "Cannot merge duplicate {} of record {}: {}",
                    docname, self.recid, e
                );
                merged_all = false;
            }
        }
        self.build_bibdoc_list()?;
        Ok(merged_all)
    }

    fn canonical_docname(&self, docname: &str) -> String {
        self.store
            .formats()
            .decompose_file(&format!("{}.pdf", docname), false, false)
            .base
    }
}
