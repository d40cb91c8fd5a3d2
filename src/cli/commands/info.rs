//! Information commands.

use console::style;

use super::super::helpers::{print_info, DeletedDocs, Selection};
use crate::bibdoc::BibDoc;
use crate::bibrecdocs::BibRecDocs;
use crate::repository::{nice_size, DocStore};

/// Print the matched records, or the matched documents when the selection
/// names documents.
pub fn cmd_get_info(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    let by_document = selection.docids.is_some() || selection.docname.is_some() || selection.doctype.is_some();
    if by_document {
        for docid in selection.docids(store)? {
            print!("{}", BibDoc::load(store, docid)?);
        }
    } else {
        let deleted_too = selection.deleted != DeletedDocs::No;
        for recid in selection.recids(store)? {
            print!("{}", BibRecDocs::new(store, recid, deleted_too)?);
        }
    }
    Ok(())
}

pub fn cmd_get_disk_usage(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    let mut total_size = 0;
    let mut total_latest_size = 0;
    for docid in selection.docids(store)? {
        let doc = BibDoc::load(store, docid)?;
        let size = doc.get_total_size();
        let latest_size = doc.get_total_size_latest_version();
        total_size += size;
        total_latest_size += latest_size;
        print_info(
            doc.get_recid(),
            docid,
            &format!("size {}, latest version size {}", nice_size(size), nice_size(latest_size)),
        );
    }
    println!();
    println!("{} Total size: {}", style("→").cyan(), nice_size(total_size));
    println!(
        "{} Latest version total size: {}",
        style("→").cyan(),
        nice_size(total_latest_size)
    );
    Ok(())
}

pub fn cmd_get_history(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    for docid in selection.docids(store)? {
        let doc = BibDoc::load(store, docid)?;
        for line in doc.get_history()? {
            print_info(doc.get_recid(), docid, &line);
        }
    }
    Ok(())
}
