//! `bibdoc`, `bibrec_bibdoc` and `bibdoc_bibdoc` rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{parse_datetime, DocStore};
use crate::access::DELETED_STATUS;
use crate::error::Result;

/// One row of the `bibdoc` table.
#[derive(Debug, Clone)]
pub struct BibDocRow {
    pub id: i64,
    pub status: String,
    pub docname: String,
    pub doctype: String,
    pub creation_date: DateTime<Utc>,
    pub modification_date: DateTime<Utc>,
}

impl BibDocRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            docname: row.get("docname")?,
            doctype: row.get("doctype")?,
            creation_date: parse_datetime(&row.get::<_, String>("creation_date")?),
            modification_date: parse_datetime(&row.get::<_, String>("modification_date")?),
        })
    }
}

impl DocStore {
    /// Reserve a new document id.
    pub fn insert_bibdoc(&self, docname: &str, doctype: &str) -> Result<i64> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO bibdoc (status, docname, creation_date, modification_date, doctype)
            VALUES ('', ?1, ?2, ?2, ?3)
            "#,
            params![docname, now, doctype],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_bibdoc_row(&self, docid: i64) -> Result<Option<BibDocRow>> {
        let conn = self.connect()?;
        let result = conn.query_row(
            "SELECT id, status, docname, doctype, creation_date, modification_date
             FROM bibdoc WHERE id = ?",
            params![docid],
            BibDocRow::from_row,
        );

        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Attach a document to a record.
    pub fn link_record(&self, recid: i64, docid: i64, doctype: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO bibrec_bibdoc (id_bibrec, id_bibdoc, type) VALUES (?1, ?2, ?3)",
            params![recid, docid, doctype],
        )?;
        Ok(())
    }

    /// First record a document is attached to.
    pub fn get_recid(&self, docid: i64) -> Result<Option<i64>> {
        let conn = self.connect()?;
        let result = conn.query_row(
            "SELECT id_bibrec FROM bibrec_bibdoc WHERE id_bibdoc = ? ORDER BY id_bibrec LIMIT 1",
            params![docid],
            |row| row.get(0),
        );

        match result {
            Ok(recid) => Ok(Some(recid)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn touch_bibdoc(&self, docid: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE bibdoc SET modification_date = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), docid],
        )?;
        Ok(())
    }

    pub fn set_docname(&self, docid: i64, docname: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE bibdoc SET docname = ?1 WHERE id = ?2",
            params![docname, docid],
        )?;
        Ok(())
    }

    pub fn set_status(&self, docid: i64, status: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE bibdoc SET status = ?1 WHERE id = ?2",
            params![status, docid],
        )?;
        Ok(())
    }

    /// Leave the deleted state. Returns false if the document was not deleted.
    pub fn restore_status(&self, docid: i64, status: &str) -> Result<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE bibdoc SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![status, docid, DELETED_STATUS],
        )?;
        Ok(updated > 0)
    }

    /// Change the doctype both on the document and on its record links.
    pub fn set_doctype(&self, docid: i64, doctype: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE bibdoc SET doctype = ?1 WHERE id = ?2",
            params![doctype, docid],
        )?;
        conn.execute(
            "UPDATE bibrec_bibdoc SET type = ?1 WHERE id_bibdoc = ?2",
            params![doctype, docid],
        )?;
        Ok(())
    }

    /// Ids of the documents of a record, ordered by name.
    pub fn record_docids(&self, recid: i64, deleted_too: bool) -> Result<Vec<i64>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT b.id FROM bibdoc b
             JOIN bibrec_bibdoc bb ON bb.id_bibdoc = b.id
             WHERE bb.id_bibrec = ?1 AND (?2 OR b.status <> ?3)
             ORDER BY b.docname, b.id",
        )?;
        let ids = stmt
            .query_map(params![recid, deleted_too, DELETED_STATUS], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Id of the live document called `docname` in a record.
    pub fn find_docid(&self, recid: i64, docname: &str) -> Result<Option<i64>> {
        let conn = self.connect()?;
        let result = conn.query_row(
            "SELECT b.id FROM bibdoc b
             JOIN bibrec_bibdoc bb ON bb.id_bibdoc = b.id
             WHERE bb.id_bibrec = ?1 AND b.docname = ?2 AND b.status <> ?3
             ORDER BY b.id LIMIT 1",
            params![recid, docname, DELETED_STATUS],
            |row| row.get(0),
        );

        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// True if a document of `recid` other than `except` is called `docname`.
    pub fn docname_taken(&self, recid: i64, docname: &str, except: Option<i64>) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bibdoc b
             JOIN bibrec_bibdoc bb ON bb.id_bibdoc = b.id
             WHERE bb.id_bibrec = ?1 AND b.docname = ?2 AND b.id <> ?3",
            params![recid, docname, except.unwrap_or(-1)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Names shared by several live documents of a record.
    pub fn duplicate_docnames(&self, recid: i64) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT b.docname FROM bibdoc b
             JOIN bibrec_bibdoc bb ON bb.id_bibdoc = b.id
             WHERE bb.id_bibrec = ?1 AND b.status <> ?2
             GROUP BY b.docname HAVING COUNT(*) > 1
             ORDER BY b.docname",
        )?;
        let names = stmt
            .query_map(params![recid, DELETED_STATUS], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn all_recids(&self) -> Result<Vec<i64>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT DISTINCT id_bibrec FROM bibrec_bibdoc ORDER BY id_bibrec")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn all_docids(&self) -> Result<Vec<i64>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id FROM bibdoc ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Remove every row mentioning `docid`, history excluded.
    pub fn purge_bibdoc_rows(&self, docid: i64) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM bibdoc WHERE id = ?", params![docid])?;
        tx.execute("DELETE FROM bibrec_bibdoc WHERE id_bibdoc = ?", params![docid])?;
        tx.execute(
            "DELETE FROM bibdoc_bibdoc WHERE id_bibdoc1 = ?1 OR id_bibdoc2 = ?1",
            params![docid],
        )?;
        tx.execute("DELETE FROM bibdocfsinfo WHERE id_bibdoc = ?", params![docid])?;
        tx.execute("DELETE FROM bibdocmoreinfo WHERE id_bibdoc = ?", params![docid])?;
        tx.execute("DELETE FROM bibdocfileflag WHERE id_bibdoc = ?", params![docid])?;
        tx.commit()?;
        Ok(())
    }
}
