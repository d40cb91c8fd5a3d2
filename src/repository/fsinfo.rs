//! The `bibdocfsinfo` cache of per-file sizes, dates and checksums.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{parse_datetime, DocStore};
use crate::error::Result;

/// Cached facts about one physical file.
#[derive(Debug, Clone, PartialEq)]
pub struct FsInfoRow {
    pub version: i64,
    pub format: String,
    pub last_version: bool,
    pub creation_date: DateTime<Utc>,
    pub modification_date: DateTime<Utc>,
    pub checksum: String,
    pub filesize: u64,
    pub mime: String,
}

impl FsInfoRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            version: row.get("version")?,
            format: row.get("format")?,
            last_version: row.get("last_version")?,
            creation_date: parse_datetime(&row.get::<_, String>("cd")?),
            modification_date: parse_datetime(&row.get::<_, String>("md")?),
            checksum: row.get("checksum")?,
            filesize: row.get::<_, i64>("filesize")?.max(0) as u64,
            mime: row.get("mime")?,
        })
    }
}

impl DocStore {
    /// Cached rows of a document ordered by version then format.
    pub fn fsinfo_rows(&self, docid: i64) -> Result<Vec<FsInfoRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT version, format, last_version, cd, md, checksum, filesize, mime
             FROM bibdocfsinfo WHERE id_bibdoc = ?
             ORDER BY version, format",
        )?;
        let rows = stmt
            .query_map(params![docid], FsInfoRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn fsinfo_exists(&self, docid: i64, version: i64, format: &str) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bibdocfsinfo WHERE id_bibdoc = ?1 AND version = ?2 AND format = ?3",
            params![docid, version, format],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Replace the cached rows of a document in one transaction.
    pub fn replace_fsinfo(&self, docid: i64, rows: &[FsInfoRow]) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM bibdocfsinfo WHERE id_bibdoc = ?", params![docid])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO bibdocfsinfo
                    (id_bibdoc, version, format, last_version, cd, md, checksum, filesize, mime)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for row in rows {
                stmt.execute(params![
                    docid,
                    row.version,
                    row.format,
                    row.last_version,
                    row.creation_date.to_rfc3339(),
                    row.modification_date.to_rfc3339(),
                    row.checksum,
                    row.filesize as i64,
                    row.mime,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_fsinfo(&self, docid: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM bibdocfsinfo WHERE id_bibdoc = ?", params![docid])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(version: i64, format: &str, last_version: bool) -> FsInfoRow {
        FsInfoRow {
            version,
            format: format.to_string(),
            last_version,
            creation_date: parse_datetime("2024-01-01T00:00:00+00:00"),
            modification_date: parse_datetime("2024-01-02T00:00:00+00:00"),
            checksum: "5eb63bbbe01eeed093cb22bb8f5acdc3".to_string(),
            filesize: 11,
            mime: "application/pdf".to_string(),
        }
    }

    #[test]
    fn test_replace_fsinfo() {
        let dir = tempdir().unwrap();
        let store = DocStore::new(&dir.path().join("test.db"), dir.path()).unwrap();

        store
            .replace_fsinfo(1, &[row(2, ".pdf", true), row(1, ".pdf", false)])
            .unwrap();
        let rows = store.fsinfo_rows(1).unwrap();
        assert_eq!(rows, vec![row(1, ".pdf", false), row(2, ".pdf", true)]);
        assert!(store.fsinfo_exists(1, 2, ".pdf").unwrap());
        assert!(!store.fsinfo_exists(1, 3, ".pdf").unwrap());

        store.replace_fsinfo(1, &[row(1, ".ps", true)]).unwrap();
        assert_eq!(store.fsinfo_rows(1).unwrap().len(), 1);

        store.delete_fsinfo(1).unwrap();
        assert!(store.fsinfo_rows(1).unwrap().is_empty());
    }
}
