//! Housekeeping commands: checksums, naming conventions and caches.

use std::collections::BTreeSet;

use console::style;

use super::super::helpers::{print_info, Selection};
use crate::bibdoc::BibDoc;
use crate::bibrecdocs::BibRecDocs;
use crate::checksum::ChecksumIndex;
use crate::repository::DocStore;

pub fn cmd_check_md5(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    let mut failures = 0;
    for docid in selection.docids(store)? {
        let doc = BibDoc::load(store, docid)?;
        let index = ChecksumIndex::open(doc.get_base_dir(), store.hasher().clone())?;
        let mut doc_ok = true;
        for file in doc.docfiles() {
            if !index.check(&file.get_file_name())? {
                doc_ok = false;
                failures += 1;
                print_info(
                    doc.get_recid(),
                    docid,
                    &format!("{} failing checksum!", file.get_full_path().display()),
                );
            }
        }
        if doc_ok {
            print_info(doc.get_recid(), docid, "checksum OK");
        }
    }
    if failures > 0 {
        anyhow::bail!("{} files failing", failures);
    }
    println!("{} All files are correct", style("✓").green());
    Ok(())
}

pub fn cmd_update_md5(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    for docid in selection.docids(store)? {
        let mut doc = BibDoc::load(store, docid)?;
        let mut index = ChecksumIndex::open(doc.get_base_dir(), store.hasher().clone())?;
        index.update(false)?;
        doc.sync_fsinfo_cache()?;
        print_info(doc.get_recid(), docid, "checksums updated");
    }
    Ok(())
}

pub fn cmd_check_format(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    let mut broken_records = 0;
    let mut total = 0;
    let mut duplicates = false;
    for recid in selection.recids(store)? {
        total += 1;
        let recdocs = BibRecDocs::new(store, recid, false)?;
        let mut broken = false;
        if !recdocs.check_duplicate_docnames()? {
            eprintln!("{} Record {} has duplicate docnames", style("!").yellow(), recid);
            broken = true;
            duplicates = true;
        }
        for docname in recdocs.get_bibdoc_names(None) {
            let ok = match recdocs.check_format(&docname) {
                Ok(ok) => ok,
                Err(e) => {
                    tracing::warn!("Cannot check {} of record {}: {}", docname, recid, e);
                    false
                }
            };
            if !ok {
                eprintln!(
                    "{} Record {} with docname {} needs format fixing",
                    style("!").yellow(),
                    recid,
                    docname
                );
                broken = true;
            }
        }
        if broken {
            broken_records += 1;
        }
    }
    if duplicates {
        println!(
            "{} At least one record has duplicate docnames; run fix-duplicate-docnames first",
            style("!").yellow()
        );
    }
    if broken_records > 0 {
        anyhow::bail!("{} out of {} records need their formats to be fixed", broken_records, total);
    }
    println!(
        "{} All records appear to be correct with respect to formats",
        style("✓").green()
    );
    Ok(())
}

pub fn cmd_check_duplicate_docnames(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    let mut count = 0;
    let mut total = 0;
    for recid in selection.recids(store)? {
        total += 1;
        if !BibRecDocs::new(store, recid, false)?.check_duplicate_docnames()? {
            count += 1;
            eprintln!("{} Record {} has duplicate docnames", style("!").yellow(), recid);
        }
    }
    if count > 0 {
        anyhow::bail!("{} out of {} records have duplicate docnames", count, total);
    }
    println!(
        "{} All records appear to be correct with respect to duplicate docnames",
        style("✓").green()
    );
    Ok(())
}

pub fn cmd_fix_all(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    for recid in selection.recids(store)? {
        let mut recdocs = BibRecDocs::new(store, recid, false)?;
        for docname in recdocs.get_bibdoc_names(None) {
            let report = recdocs.fix(&docname)?;
            println!(
                "  {} {} of record {}: versions {:?}",
                style("✓").green(),
                docname,
                recid,
                report.versions
            );
            for sibling in &report.siblings {
                println!(
                    "    {} Colliding files moved to new document {}",
                    style("!").yellow(),
                    sibling
                );
            }
        }
    }
    Ok(())
}

fn fix_format_of(store: &DocStore, recids: impl IntoIterator<Item = i64>) -> anyhow::Result<(usize, usize)> {
    let mut fixed = 0;
    let mut total = 0;
    for recid in recids {
        total += 1;
        let mut recdocs = BibRecDocs::new(store, recid, false)?;
        let mut record_fixed = false;
        for docname in recdocs.get_bibdoc_names(None) {
            if recdocs.check_format(&docname).unwrap_or(false) {
                continue;
            }
            if recdocs.fix_format(&docname, true)? {
                eprintln!("{} Record {} has been fixed for docname {}", style("✓").green(), recid, docname);
            } else {
                eprintln!(
                    "{} Record {} has been fixed for docname {}, but a new document might have been created",
                    style("!").yellow(),
                    recid,
                    docname
                );
            }
            record_fixed = true;
        }
        if record_fixed {
            fixed += 1;
        }
    }
    Ok((fixed, total))
}

pub fn cmd_fix_format(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    let (fixed, total) = fix_format_of(store, selection.recids(store)?)?;
    println!("{} {} out of {} records needed to be fixed", style("→").cyan(), fixed, total);
    Ok(())
}

pub fn cmd_fix_duplicate_docnames(store: &DocStore, selection: &Selection) -> anyhow::Result<()> {
    let mut fixed = 0;
    let mut total = 0;
    for recid in selection.recids(store)? {
        total += 1;
        let mut recdocs = BibRecDocs::new(store, recid, false)?;
        if recdocs.check_duplicate_docnames()? {
            continue;
        }
        if recdocs.fix_duplicate_docnames(true)? {
            eprintln!("{} Record {} has been fixed for duplicate docnames", style("✓").green(), recid);
        } else {
            eprintln!(
                "{} Record {} still has documents that could not be merged",
                style("!").yellow(),
                recid
            );
        }
        fixed += 1;
    }
    println!("{} {} out of {} records needed to be fixed", style("→").cyan(), fixed, total);
    Ok(())
}

/// Rewrite the fsinfo rows of every document, then fix the formats of the
/// records whose documents could not be synced.
pub fn cmd_fix_bibdocfsinfo_cache(store: &DocStore) -> anyhow::Result<()> {
    let mut to_be_fixed = BTreeSet::new();
    for docid in store.all_docids()? {
        let mut doc = match BibDoc::load(store, docid) {
            Ok(doc) => doc,
            Err(e) => {
                eprintln!("{} Docid {}: {}", style("✗").red(), docid, e);
                continue;
            }
        };
        match doc.sync_fsinfo_cache() {
            Ok(()) => print_info(doc.get_recid(), docid, "fsinfo cache rebuilt"),
            Err(e) => {
                eprintln!("{} Docid {}: {}", style("✗").red(), docid, e);
                if let Some(recid) = doc.get_recid() {
                    to_be_fixed.insert(recid);
                }
            }
        }
    }
    if !to_be_fixed.is_empty() {
        println!("{} Fixing formats of {} records", style("→").cyan(), to_be_fixed.len());
        fix_format_of(store, to_be_fixed)?;
    }
    Ok(())
}
