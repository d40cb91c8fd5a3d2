//! Lifecycle of a single document: versions, formats, deletion and the
//! on-disk checksum index.

use std::fs;
use std::path::{Path, PathBuf};

use bibdocfile::checksum::{ChecksumIndex, Md5Hasher};
use bibdocfile::models::DocFlag;
use bibdocfile::{BibDoc, BibDocFileError, BibRecDocs, DocStore, FileOptions};
use tempfile::{tempdir, TempDir};

const RECID: i64 = 1;

fn setup() -> (TempDir, DocStore) {
    let dir = tempdir().unwrap();
    let store = DocStore::new(&dir.path().join("bibdoc.db"), &dir.path().join("files")).unwrap();
    fs::create_dir_all(dir.path().join("incoming")).unwrap();
    (dir, store)
}

fn source(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join("incoming").join(name);
    fs::write(&path, content).unwrap();
    path
}

fn new_doc(store: &DocStore, docname: &str) -> BibDoc {
    BibDoc::create(store, Some(RECID), docname, "Main").unwrap()
}

fn formats_of(doc: &BibDoc, version: i64) -> Vec<String> {
    let mut formats: Vec<String> = doc
        .list_version_files(version, true)
        .iter()
        .map(|f| f.get_format().to_string())
        .collect();
    formats.sort();
    formats
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

#[test]
fn test_paper_scenario() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");

    let pdf = source(&dir, "paper.pdf", b"%PDF-1.4 first");
    assert_eq!(doc.add_file_new_version(&pdf, &FileOptions::default()).unwrap(), 1);
    assert_eq!(doc.get_latest_version(), 1);

    let ps = source(&dir, "paper.ps", b"%!PS-Adobe");
    assert_eq!(doc.add_file_new_format(&ps, Some(1), &FileOptions::default()).unwrap(), 1);
    assert_eq!(formats_of(&doc, 1), vec![".pdf", ".ps"]);

    let other_pdf = source(&dir, "other.pdf", b"%PDF-1.4 second");
    let err = doc
        .add_file_new_format(&other_pdf, Some(1), &FileOptions::default())
        .unwrap_err();
    assert!(matches!(err, BibDocFileError::FormatExists { version: 1, .. }));

    assert_eq!(doc.add_file_new_version(&other_pdf, &FileOptions::default()).unwrap(), 2);
    assert_eq!(doc.get_latest_version(), 2);
    assert_eq!(formats_of(&doc, 1), vec![".pdf", ".ps"]);
    let original = doc.get_file(".pdf", Some(1), true).unwrap();
    assert_eq!(original.get_content().unwrap(), b"%PDF-1.4 first");
}

#[test]
fn test_duplicate_format_leaves_disk_untouched() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"one"), &FileOptions::default())
        .unwrap();
    let before = files_in(doc.get_base_dir());
    let history_before = doc.get_history().unwrap().len();

    let result = doc.add_file_new_format(&source(&dir, "again.pdf", b"two"), None, &FileOptions::default());
    assert!(matches!(result, Err(BibDocFileError::FormatExists { .. })));
    assert_eq!(files_in(doc.get_base_dir()), before);
    assert_eq!(doc.get_history().unwrap().len(), history_before);
    assert_eq!(doc.get_file(".pdf", Some(1), true).unwrap().get_content().unwrap(), b"one");
}

#[test]
fn test_empty_and_missing_sources_are_rejected() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");

    let empty = source(&dir, "empty.pdf", b"");
    assert!(matches!(
        doc.add_file_new_version(&empty, &FileOptions::default()),
        Err(BibDocFileError::EmptyFile(_))
    ));
    let missing = dir.path().join("incoming").join("missing.pdf");
    assert!(doc
        .add_file_new_version(&missing, &FileOptions::default())
        .unwrap_err()
        .is_not_found());
    assert_eq!(doc.get_latest_version(), 0);
}

#[test]
fn test_versions_are_dense() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "thesis");
    for n in 1..=4 {
        let path = source(&dir, "thesis.pdf", format!("revision {}", n).as_bytes());
        assert_eq!(doc.add_file_new_version(&path, &FileOptions::default()).unwrap(), n);
    }
    assert_eq!(doc.get_latest_version(), 4);
    assert_eq!(doc.list_versions(), vec![1, 2, 3, 4]);

    let reloaded = BibDoc::load(&store, doc.id()).unwrap();
    assert_eq!(reloaded.list_versions(), vec![1, 2, 3, 4]);
    assert_eq!(reloaded.list_latest_files(true).len(), 1);
}

#[test]
fn test_revert_carries_metadata_forward() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    let first = FileOptions {
        comment: Some("camera ready".to_string()),
        description: Some("Accepted version".to_string()),
        ..FileOptions::default()
    };
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"v1 pdf"), &first).unwrap();
    doc.add_file_new_format(&source(&dir, "paper.ps", b"v1 ps"), None, &FileOptions::default())
        .unwrap();
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"v2 pdf"), &FileOptions::default())
        .unwrap();

    assert_eq!(doc.revert(1).unwrap(), 3);
    assert_eq!(formats_of(&doc, 3), vec![".pdf", ".ps"]);
    assert_eq!(
        doc.get_file(".pdf", Some(3), true).unwrap().get_content().unwrap(),
        b"v1 pdf"
    );
    assert_eq!(doc.get_comment(".pdf", Some(3)).unwrap().as_deref(), Some("camera ready"));
    assert_eq!(
        doc.get_description(".pdf", Some(3)).unwrap().as_deref(),
        Some("Accepted version")
    );
    assert!(doc.revert(9).unwrap_err().is_not_found());
}

#[test]
fn test_purge_keeps_latest_version() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    for n in 1..=3 {
        let path = source(&dir, "paper.pdf", format!("v{}", n).as_bytes());
        doc.add_file_new_version(&path, &FileOptions::default()).unwrap();
    }
    doc.purge().unwrap();
    assert_eq!(doc.list_versions(), vec![3]);
    assert_eq!(files_in(doc.get_base_dir()), vec!["paper.pdf;3"]);
}

#[test]
fn test_hide_previous_versions() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"v1"), &FileOptions::default())
        .unwrap();
    let options = FileOptions {
        flags: vec![DocFlag::PerformHidePrevious],
        ..FileOptions::default()
    };
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"v2"), &options).unwrap();

    assert!(doc.hidden_p(".pdf", Some(1)).unwrap());
    assert!(!doc.hidden_p(".pdf", Some(2)).unwrap());
    assert_eq!(doc.list_all_files(false).len(), 1);
    assert_eq!(doc.list_all_files(true).len(), 2);
    assert!(!doc.has_flag(DocFlag::PerformHidePrevious, ".pdf", Some(2)).unwrap());

    doc.unhide(".pdf", Some(1)).unwrap();
    assert_eq!(doc.list_all_files(false).len(), 2);
}

#[test]
fn test_delete_undelete_round_trip() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"content"), &FileOptions::default())
        .unwrap();
    doc.set_status("restricted").unwrap();
    assert!(matches!(doc.set_status("DELETED"), Err(BibDocFileError::ReservedStatus(_))));

    doc.delete().unwrap();
    assert!(doc.get_docname().starts_with("DELETED-"));
    assert!(doc.get_docname().ends_with("-paper"));
    assert_eq!(doc.get_status(), "DELETED");
    assert!(BibRecDocs::new(&store, RECID, false).unwrap().empty_p());

    doc.undelete("restricted").unwrap();
    assert_eq!(doc.get_docname(), "paper");
    assert_eq!(doc.get_status(), "restricted");
    assert_eq!(files_in(doc.get_base_dir()), vec!["paper.pdf;1"]);
    assert!(doc.get_file(".pdf", None, true).unwrap().check().unwrap());
}

#[test]
fn test_undelete_with_taken_name() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"old"), &FileOptions::default())
        .unwrap();
    doc.delete().unwrap();

    let mut replacement = new_doc(&store, "paper");
    replacement
        .add_file_new_version(&source(&dir, "paper.pdf", b"new"), &FileOptions::default())
        .unwrap();

    doc.undelete("").unwrap();
    assert_eq!(doc.get_docname(), "paper_1");
    assert_eq!(doc.get_status(), "");
    assert!(matches!(doc.undelete(""), Err(BibDocFileError::InvalidName(_))));
}

#[test]
fn test_undelete_refuses_live_document() {
    let (dir, store) = setup();
    let name = "DELETED-20240101000000000000-x";
    let mut doc = new_doc(&store, name);
    doc.add_file_new_version(&source(&dir, "x.pdf", b"live"), &FileOptions::default())
        .unwrap();

    assert!(matches!(doc.undelete(""), Err(BibDocFileError::InvalidName(_))));
    assert_eq!(doc.get_docname(), name);
    assert_eq!(doc.get_status(), "");
    assert_eq!(files_in(doc.get_base_dir()), vec![format!("{}.pdf;1", name)]);
    let reloaded = BibDoc::load(&store, doc.id()).unwrap();
    assert_eq!(reloaded.get_docname(), name);
}

#[test]
fn test_version_separator_in_docname_is_rejected() {
    let (dir, store) = setup();
    assert!(matches!(
        BibDoc::create(&store, Some(RECID), "v;1", "Main"),
        Err(BibDocFileError::InvalidName(_))
    ));

    let mut doc = new_doc(&store, "v");
    doc.add_file_new_version(&source(&dir, "in.pdf", b"data"), &FileOptions::default())
        .unwrap();
    assert!(matches!(doc.change_name("a;1"), Err(BibDocFileError::InvalidName(_))));
    assert_eq!(doc.get_docname(), "v");
    assert_eq!(formats_of(&doc, 1), vec![".pdf"]);
    assert_eq!(files_in(doc.get_base_dir()), vec!["v.pdf;1"]);
}

#[test]
fn test_is_identical_to() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    let original = source(&dir, "paper.pdf", b"exactly these bytes");
    doc.add_file_new_version(&original, &FileOptions::default()).unwrap();
    let stored = doc.get_file(".pdf", None, true).unwrap();

    assert!(stored.is_identical_to(&original, ".pdf").unwrap());
    assert!(stored.is_identical_to(stored.get_full_path(), ".pdf").unwrap());
    assert!(!stored.is_identical_to(&original, ".pdf;pdfa").unwrap());
    let same_size = source(&dir, "same.pdf", b"exactly those bytes");
    assert!(!stored.is_identical_to(&same_size, ".pdf").unwrap());
    let longer = source(&dir, "longer.pdf", b"exactly these bytes and more");
    assert!(!stored.is_identical_to(&longer, ".pdf").unwrap());
}

#[test]
fn test_checksum_sidecar_round_trip() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "notes");
    doc.add_file_new_version(&source(&dir, "notes.txt", b"hello world"), &FileOptions::default())
        .unwrap();
    let file = doc.get_file(".txt", None, true).unwrap();
    assert_eq!(file.get_checksum(), "5eb63bbbe01eeed093cb22bb8f5acdc3");

    let sidecar = fs::read_to_string(doc.get_base_dir().join(".md5")).unwrap();
    assert!(sidecar.contains("5eb63bbbe01eeed093cb22bb8f5acdc3 *notes.txt;1"));

    let mut index = ChecksumIndex::open(doc.get_base_dir(), Md5Hasher::default()).unwrap();
    assert_eq!(
        index.get_checksum("notes.txt;1").unwrap(),
        Md5Hasher::default().calculate(file.get_full_path()).unwrap()
    );
    assert!(index.check("notes.txt;1").unwrap());
    assert!(file.check().unwrap());

    fs::write(file.get_full_path(), b"hello there").unwrap();
    assert!(!index.check("notes.txt;1").unwrap());
    assert!(!file.check().unwrap());
}

#[test]
fn test_history_records_changes() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"pdf"), &FileOptions::default())
        .unwrap();
    doc.add_file_new_format(&source(&dir, "paper.ps", b"ps"), None, &FileOptions::default())
        .unwrap();
    doc.delete_file(".ps", 1).unwrap();
    doc.change_name("article").unwrap();

    let history = doc.get_history().unwrap();
    assert_eq!(history.iter().filter(|l| l.contains(" ADDED ")).count(), 2);
    assert!(history.iter().any(|l| l.contains(" DELETED 'paper', format: '.ps'")));
    assert!(history.iter().any(|l| l.contains(" RENAMEDFROM 'paper'")));
    assert!(history.iter().any(|l| l.contains(" RENAMEDTO 'article'")));
    assert_eq!(files_in(doc.get_base_dir()), vec!["article.pdf;1"]);
}

#[test]
fn test_change_docformat() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "scan");
    doc.add_file_new_version(&source(&dir, "scan.jpg", b"jpeg data"), &FileOptions::default())
        .unwrap();
    doc.add_file_new_format(&source(&dir, "scan.png", b"png data"), None, &FileOptions::default())
        .unwrap();

    assert!(matches!(
        doc.change_docformat(".jpg", ".png"),
        Err(BibDocFileError::FormatExists { .. })
    ));
    doc.change_docformat(".jpg", ".jpeg").unwrap();
    assert_eq!(formats_of(&doc, 1), vec![".jpeg", ".png"]);
    assert!(doc.get_file(".jpeg", Some(1), true).unwrap().check().unwrap());
}

#[test]
fn test_fsinfo_cache_matches_disk() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"pdf"), &FileOptions::default())
        .unwrap();
    doc.add_file_new_format(&source(&dir, "paper.ps", b"ps"), None, &FileOptions::default())
        .unwrap();

    let cached = BibDoc::load(&store, doc.id()).unwrap();
    let uncached = BibDoc::load(&store.clone().with_fsinfo_cache(false), doc.id()).unwrap();
    let describe = |d: &BibDoc| {
        let mut files: Vec<(String, i64, u64, String)> = d
            .docfiles()
            .iter()
            .map(|f| (f.get_format().to_string(), f.get_version(), f.get_size(), f.get_checksum().to_string()))
            .collect();
        files.sort();
        files
    };
    assert_eq!(describe(&cached), describe(&uncached));
}

#[test]
fn test_icons() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"pdf"), &FileOptions::default())
        .unwrap();
    doc.add_icon(&source(&dir, "thumb.gif", b"GIF89a"), None).unwrap();

    let icon = doc.get_icon(None).unwrap();
    assert_eq!(icon.get_format(), ".gif;icon");
    assert!(icon.is_icon());
    assert_eq!(icon.get_superformat(), ".gif");
    assert!(doc.get_icon(Some("icon-180")).is_none());

    doc.delete_icon(None).unwrap();
    assert!(doc.get_icon(None).is_none());
    assert_eq!(formats_of(&doc, 1), vec![".pdf"]);
}

#[test]
fn test_expunge_removes_everything() {
    let (dir, store) = setup();
    let mut doc = new_doc(&store, "paper");
    doc.add_file_new_version(&source(&dir, "paper.pdf", b"pdf"), &FileOptions::default())
        .unwrap();
    let docid = doc.id();
    let basedir = doc.get_base_dir().to_path_buf();

    doc.expunge().unwrap();
    assert!(!basedir.exists());
    assert!(BibDoc::load(&store, docid).unwrap_err().is_not_found());
    assert!(store
        .history(docid)
        .unwrap()
        .iter()
        .any(|entry| entry.action.as_str() == "EXPUNGE"));
}
