//! Append-only audit log of file changes (`hstDOCUMENT`).

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use super::{parse_datetime, DocStore};
use crate::error::Result;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocAction {
    #[serde(rename = "ADDED")]
    Added,
    #[serde(rename = "DELETED")]
    Deleted,
    #[serde(rename = "RENAMEDFROM")]
    RenamedFrom,
    #[serde(rename = "RENAMEDTO")]
    RenamedTo,
    #[serde(rename = "EXPUNGE")]
    Expunge,
}

impl DocAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Deleted => "DELETED",
            Self::RenamedFrom => "RENAMEDFROM",
            Self::RenamedTo => "RENAMEDTO",
            Self::Expunge => "EXPUNGE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "ADDED" => Some(Self::Added),
            "DELETED" => Some(Self::Deleted),
            "RENAMEDFROM" => Some(Self::RenamedFrom),
            "RENAMEDTO" => Some(Self::RenamedTo),
            "EXPUNGE" => Some(Self::Expunge),
            _ => None,
        }
    }
}

impl fmt::Display for DocAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit log line.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub docid: i64,
    pub action: DocAction,
    pub docname: String,
    pub format: String,
    pub version: i64,
    pub size: u64,
    pub checksum: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Entry for a whole-document event with no file attached.
    pub fn document(docid: i64, action: DocAction, docname: &str) -> Self {
        Self {
            docid,
            action,
            docname: docname.to_string(),
            format: String::new(),
            version: 0,
            size: 0,
            checksum: String::new(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}', format: '{}', version: {}, size: {}, checksum: '{}'",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.action,
            self.docname,
            self.format,
            self.version,
            nice_size(self.size),
            self.checksum
        )
    }
}

/// Human readable size with binary units.
pub fn nice_size(size: u64) -> String {
    let mut value = size as f64;
    let mut unit = "B";
    for next in ["KB", "MB", "GB"] {
        if value <= 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    if unit == "B" {
        format!("{} {}", size, unit)
    } else {
        format!("{:.2} {}", value, unit)
    }
}

impl DocStore {
    pub fn log_action(&self, entry: &HistoryEntry) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO hstDOCUMENT
                (id_bibdoc, docname, docformat, docversion, docsize, docchecksum, doctimestamp, action)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.docid,
                entry.docname,
                entry.format,
                entry.version,
                entry.size as i64,
                entry.checksum,
                entry.timestamp.to_rfc3339(),
                entry.action.as_str(),
            ],
        )?;
        Ok(())
    }

    /// History of a document, oldest first.
    pub fn history(&self, docid: i64) -> Result<Vec<HistoryEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id_bibdoc, action, docname, docformat, docversion, docsize, docchecksum, doctimestamp
             FROM hstDOCUMENT WHERE id_bibdoc = ?
             ORDER BY doctimestamp, id",
        )?;
        let rows = stmt
            .query_map(params![docid], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(docid, action, docname, format, version, size, checksum, ts)| {
                Some(HistoryEntry {
                    docid,
                    action: DocAction::parse(&action)?,
                    docname,
                    format,
                    version,
                    size: size.max(0) as u64,
                    checksum,
                    timestamp: parse_datetime(&ts),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_nice_size() {
        assert_eq!(nice_size(512), "512 B");
        assert_eq!(nice_size(2048), "2.00 KB");
        assert_eq!(nice_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_log_and_read_history() {
        let dir = tempdir().unwrap();
        let store = DocStore::new(&dir.path().join("test.db"), dir.path()).unwrap();

        let mut entry = HistoryEntry::document(4, DocAction::Added, "paper");
        entry.format = ".pdf".to_string();
        entry.version = 1;
        entry.size = 11;
        entry.checksum = "5eb63bbbe01eeed093cb22bb8f5acdc3".to_string();
        entry.timestamp = parse_datetime("2024-05-06T07:08:09+00:00");
        store.log_action(&entry).unwrap();
        store
            .log_action(&HistoryEntry::document(4, DocAction::Expunge, "paper"))
            .unwrap();

        let history = store.history(4).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, DocAction::Added);
        assert_eq!(
            history[0].to_string(),
            "2024-05-06 07:08:09 ADDED 'paper', format: '.pdf', version: 1, size: 11 B, checksum: '5eb63bbbe01eeed093cb22bb8f5acdc3'"
        );
        assert_eq!(history[1].action, DocAction::Expunge);
        assert!(store.history(5).unwrap().is_empty());
    }
}
