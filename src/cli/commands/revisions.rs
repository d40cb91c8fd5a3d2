//! Commands adding, reverting and removing content.

use std::path::Path;

use console::style;

use super::super::helpers::{parse_flags, Selection};
use crate::bibdoc::{BibDoc, FileOptions};
use crate::bibrecdocs::BibRecDocs;
use crate::models::DocFlag;
use crate::repository::DocStore;

/// Options shared by `append` and `revise`.
#[derive(Debug, Default)]
pub struct RevisionArgs {
    pub docname: Option<String>,
    pub new_docname: Option<String>,
    pub doctype: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub restriction: Option<String>,
    pub flags: Option<String>,
    pub hide_previous: bool,
}

impl RevisionArgs {
    /// Docname and normalized format, derived from `path` when not given.
    fn resolve(&self, store: &DocStore, path: &Path) -> (String, String) {
        let formats = store.formats();
        let decomposed = formats.decompose_file(&path.to_string_lossy(), false, false);
        let docname = self.docname.clone().unwrap_or(decomposed.base);
        let format = formats.normalize_format(self.format.as_deref().unwrap_or(&decomposed.format));
        (docname, format)
    }

    fn file_options(&self, format: &str) -> anyhow::Result<FileOptions> {
        let mut flags = parse_flags(self.flags.as_deref())?;
        if self.hide_previous && !flags.contains(&DocFlag::PerformHidePrevious) {
            flags.push(DocFlag::PerformHidePrevious);
        }
        Ok(FileOptions {
            description: self.description.clone(),
            comment: self.comment.clone(),
            format: Some(format.to_string()),
            flags,
            modification_date: None,
        })
    }
}

/// Add `path` as a new format. A document that already has the format is
/// left alone and a new document with a unique name receives the file.
pub fn cmd_append(store: &DocStore, selection: &Selection, path: &Path, args: RevisionArgs) -> anyhow::Result<()> {
    let recid = selection.single_recid(store)?;
    let mut recdocs = BibRecDocs::new(store, recid, false)?;
    let (mut docname, format) = args.resolve(store, path);

    if recdocs.has_docname_p(&docname)? && recdocs.get_bibdoc(&docname)?.format_already_exists_p(&format) {
        let proposed = recdocs.propose_unique_docname(&docname)?;
        println!(
            "{} {} of record {} already has format {}, creating {} instead",
            style("!").yellow(),
            docname,
            recid,
            format,
            proposed
        );
        docname = proposed;
    }

    let doctype = args.doctype.as_deref().unwrap_or("Main");
    let options = args.file_options(&format)?;
    let mut doc = recdocs.add_new_file(path, doctype, Some(&docname), false, &options)?;
    if let Some(restriction) = &args.restriction {
        doc.set_status(restriction)?;
    }
    println!(
        "{} Appended {} to {} of record {}",
        style("✓").green(),
        path.display(),
        doc.get_docname(),
        recid
    );
    Ok(())
}

/// Add `path` as a new version of an existing document.
pub fn cmd_revise(store: &DocStore, selection: &Selection, path: &Path, args: RevisionArgs) -> anyhow::Result<()> {
    let recid = selection.single_recid(store)?;
    let mut recdocs = BibRecDocs::new(store, recid, false)?;
    let (mut docname, format) = args.resolve(store, path);

    if let Some(new_docname) = &args.new_docname {
        recdocs.change_name(new_docname, &docname)?;
        docname = new_docname.clone();
    }

    let options = args.file_options(&format)?;
    let mut doc = recdocs.add_new_version(path, Some(&docname), &options)?;
    if let Some(restriction) = &args.restriction {
        doc.set_status(restriction)?;
    }
    println!(
        "{} {} of record {} is now at version {}",
        style("✓").green(),
        docname,
        recid,
        doc.get_latest_version()
    );
    Ok(())
}

pub fn cmd_revert(store: &DocStore, selection: &Selection, version: i64) -> anyhow::Result<()> {
    if version <= 0 {
        anyhow::bail!("Version must be a positive integer, not {}", version);
    }
    let mut doc = BibDoc::load(store, selection.single_docid(store)?)?;
    let new_version = doc.revert(version)?;
    println!(
        "{} Reverted {} to version {} as version {}",
        style("✓").green(),
        doc.get_docname(),
        version,
        new_version
    );
    Ok(())
}

pub fn cmd_delete(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    for docid in selection.docids(store)? {
        let mut doc = BibDoc::load(store, docid)?;
        let docname = doc.get_docname().to_string();
        doc.delete()?;
        println!("  {} Deleted {} (docid {})", style("✓").green(), docname, docid);
    }
    Ok(())
}

pub fn cmd_hard_delete(store: &DocStore, selection: &Selection, format: &str, version: i64) -> anyhow::Result<()> {
    if version <= 0 {
        anyhow::bail!("Version must be a positive integer, not {}", version);
    }
    let mut doc = BibDoc::load(store, selection.single_docid(store)?)?;
    let format = store.formats().normalize_format(format);
    doc.delete_file(&format, version)?;
    println!(
        "{} Removed format {} of version {} of {}",
        style("✓").green(),
        format,
        version,
        doc.get_docname()
    );
    Ok(())
}

pub fn cmd_undelete(store: &DocStore, selection: &Selection, restriction: &str) -> anyhow::Result<()> {
    let docids = selection.docids(store)?;
    for docid in &docids {
        let mut doc = BibDoc::load(store, *docid)?;
        doc.undelete(restriction)?;
        println!("  {} Restored {} (docid {})", style("✓").green(), doc.get_docname(), docid);
    }
    if docids.is_empty() {
        println!("{} No deleted document matched", style("!").yellow());
    }
    Ok(())
}

pub fn cmd_purge(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    for docid in selection.docids(store)? {
        let mut doc = BibDoc::load(store, docid)?;
        doc.purge()?;
        println!("  {} Purged {} (docid {})", style("✓").green(), doc.get_docname(), docid);
    }
    Ok(())
}

pub fn cmd_expunge(store: &DocStore, selection: &Selection, confirmed: bool) -> anyhow::Result<()> {
    if !confirmed {
        anyhow::bail!("Expunging cannot be undone; rerun with --yes-i-know");
    }
    for docid in selection.docids(store)? {
        let doc = BibDoc::load(store, docid)?;
        let docname = doc.get_docname().to_string();
        doc.expunge()?;
        println!("  {} Expunged {} (docid {})", style("✓").green(), docname, docid);
    }
    Ok(())
}
