//! Commands changing document and file metadata.

use console::style;

use super::super::helpers::{parse_versions, Selection};
use crate::bibdoc::BibDoc;
use crate::repository::DocStore;

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

/// Formats of the latest files of `doc`, optionally only `format`.
fn latest_formats(doc: &BibDoc, format: Option<&str>) -> Vec<String> {
    let wanted = format.map(|f| doc.store().formats().normalize_format(f));
    doc.list_latest_files(true)
        .into_iter()
        .map(|f| f.get_format().to_string())
        .filter(|f| wanted.as_ref().map_or(true, |w| w == f))
        .collect()
}

pub fn cmd_set_doctype(store: &DocStore, selection: &Selection, doctype: &str) -> anyhow::Result<()> {
    for docid in selection.docids(store)? {
        let mut doc = BibDoc::load(store, docid)?;
        doc.change_doctype(doctype)?;
        println!("  {} {} is now of type {}", style("✓").green(), doc.get_docname(), doctype);
    }
    Ok(())
}

pub fn cmd_set_description(
    store: &DocStore,
    selection: &Selection,
    description: &str,
    format: Option<&str>,
) -> anyhow::Result<()> {
    for docid in selection.docids(store)? {
        let mut doc = BibDoc::load(store, docid)?;
        for docformat in latest_formats(&doc, format) {
            doc.set_description(non_empty(description), &docformat, None)?;
        }
        println!("  {} Updated description of {}", style("✓").green(), doc.get_docname());
    }
    Ok(())
}

pub fn cmd_set_comment(
    store: &DocStore,
    selection: &Selection,
    comment: &str,
    format: Option<&str>,
) -> anyhow::Result<()> {
    for docid in selection.docids(store)? {
        let mut doc = BibDoc::load(store, docid)?;
        for docformat in latest_formats(&doc, format) {
            doc.set_comment(non_empty(comment), &docformat, None)?;
        }
        println!("  {} Updated comment of {}", style("✓").green(), doc.get_docname());
    }
    Ok(())
}

pub fn cmd_set_restriction(store: &DocStore, selection: &Selection, restriction: &str) -> anyhow::Result<()> {
    for docid in selection.docids(store)? {
        let mut doc = BibDoc::load(store, docid)?;
        doc.set_status(restriction)?;
        if restriction.is_empty() {
            println!("  {} {} is now public", style("✓").green(), doc.get_docname());
        } else {
            println!("  {} {} is now restricted to {:?}", style("✓").green(), doc.get_docname(), restriction);
        }
    }
    Ok(())
}

pub fn cmd_set_docname(store: &DocStore, selection: &Selection, docname: &str) -> anyhow::Result<()> {
    let mut doc = BibDoc::load(store, selection.single_docid(store)?)?;
    let old = doc.get_docname().to_string();
    doc.change_name(docname)?;
    println!("  {} Renamed {} to {}", style("✓").green(), old, docname);
    Ok(())
}

/// Hide or unhide the matched files.
pub fn cmd_hide(
    store: &DocStore,
    selection: &Selection,
    versions: Option<&str>,
    format: Option<&str>,
    hide: bool,
) -> anyhow::Result<()> {
    let versions = parse_versions(versions)?;
    for docid in selection.docids(store)? {
        let mut doc = BibDoc::load(store, docid)?;
        let wanted_format = format.map(|f| store.formats().normalize_format(f));
        let targets: Vec<(String, i64)> = doc
            .docfiles()
            .iter()
            .filter(|f| versions.as_ref().map_or(true, |v| v.contains(&f.get_version())))
            .filter(|f| wanted_format.as_ref().map_or(true, |w| w == f.get_format()))
            .map(|f| (f.get_format().to_string(), f.get_version()))
            .collect();

        for (docformat, version) in &targets {
            if hide {
                doc.hide(docformat, Some(*version))?;
            } else {
                doc.unhide(docformat, Some(*version))?;
            }
        }
        println!(
            "  {} {} {} file(s) of {}",
            style("✓").green(),
            if hide { "Hid" } else { "Unhid" },
            targets.len(),
            doc.get_docname()
        );
    }
    Ok(())
}
