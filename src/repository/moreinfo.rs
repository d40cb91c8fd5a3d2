//! Per-(format, version) comments, descriptions and flags.

use std::collections::HashMap;

use rusqlite::params;

use super::DocStore;
use crate::error::Result;
use crate::models::{DocFlag, FileMetadata};

impl DocStore {
    /// Metadata of one (format, version); empty when nothing is stored.
    pub fn get_file_metadata(&self, docid: i64, version: i64, format: &str) -> Result<FileMetadata> {
        let conn = self.connect()?;
        let mut metadata = FileMetadata::default();

        let result = conn.query_row(
            "SELECT comment, description FROM bibdocmoreinfo
             WHERE id_bibdoc = ?1 AND version = ?2 AND format = ?3",
            params![docid, version, format],
            |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
        );
        match result {
            Ok((comment, description)) => {
                metadata.comment = comment;
                metadata.description = description;
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }

        let mut stmt = conn.prepare(
            "SELECT flag FROM bibdocfileflag WHERE id_bibdoc = ?1 AND version = ?2 AND format = ?3",
        )?;
        let flags = stmt
            .query_map(params![docid, version, format], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        metadata.flags = flags.iter().filter_map(|f| f.parse::<DocFlag>().ok()).collect();
        Ok(metadata)
    }

    /// Metadata of every (version, format) of a document.
    pub fn all_file_metadata(&self, docid: i64) -> Result<HashMap<(i64, String), FileMetadata>> {
        let conn = self.connect()?;
        let mut all: HashMap<(i64, String), FileMetadata> = HashMap::new();

        let mut stmt = conn.prepare(
            "SELECT version, format, comment, description FROM bibdocmoreinfo WHERE id_bibdoc = ?",
        )?;
        let rows = stmt
            .query_map(params![docid], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (version, format, comment, description) in rows {
            let entry = all.entry((version, format)).or_default();
            entry.comment = comment;
            entry.description = description;
        }

        let mut stmt = conn.prepare("SELECT version, format, flag FROM bibdocfileflag WHERE id_bibdoc = ?")?;
        let rows = stmt
            .query_map(params![docid], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (version, format, flag) in rows {
            if let Ok(flag) = flag.parse::<DocFlag>() {
                all.entry((version, format)).or_default().flags.insert(flag);
            }
        }
        Ok(all)
    }

    pub fn set_comment(&self, docid: i64, version: i64, format: &str, comment: Option<&str>) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO bibdocmoreinfo (id_bibdoc, version, format, comment)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id_bibdoc, version, format) DO UPDATE SET comment = excluded.comment
            "#,
            params![docid, version, format, comment],
        )?;
        Ok(())
    }

    pub fn set_description(
        &self,
        docid: i64,
        version: i64,
        format: &str,
        description: Option<&str>,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO bibdocmoreinfo (id_bibdoc, version, format, description)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id_bibdoc, version, format) DO UPDATE SET description = excluded.description
            "#,
            params![docid, version, format, description],
        )?;
        Ok(())
    }

    pub fn has_flag(&self, docid: i64, version: i64, format: &str, flag: DocFlag) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bibdocfileflag
             WHERE id_bibdoc = ?1 AND version = ?2 AND format = ?3 AND flag = ?4",
            params![docid, version, format, flag.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn set_flag(&self, docid: i64, version: i64, format: &str, flag: DocFlag) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO bibdocfileflag (id_bibdoc, version, format, flag) VALUES (?1, ?2, ?3, ?4)",
            params![docid, version, format, flag.as_str()],
        )?;
        Ok(())
    }

    pub fn unset_flag(&self, docid: i64, version: i64, format: &str, flag: DocFlag) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM bibdocfileflag WHERE id_bibdoc = ?1 AND version = ?2 AND format = ?3 AND flag = ?4",
            params![docid, version, format, flag.as_str()],
        )?;
        Ok(())
    }

    /// Drop comment, description and flags of one (format, version).
    pub fn delete_file_metadata(&self, docid: i64, version: i64, format: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM bibdocmoreinfo WHERE id_bibdoc = ?1 AND version = ?2 AND format = ?3",
            params![docid, version, format],
        )?;
        conn.execute(
            "DELETE FROM bibdocfileflag WHERE id_bibdoc = ?1 AND version = ?2 AND format = ?3",
            params![docid, version, format],
        )?;
        Ok(())
    }

    /// Re-key the metadata of one version from `old_format` to `new_format`.
    pub fn rename_file_metadata(&self, docid: i64, version: i64, old_format: &str, new_format: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE bibdocmoreinfo SET format = ?1 WHERE id_bibdoc = ?2 AND version = ?3 AND format = ?4",
            params![new_format, docid, version, old_format],
        )?;
        conn.execute(
            "UPDATE bibdocfileflag SET format = ?1 WHERE id_bibdoc = ?2 AND version = ?3 AND format = ?4",
            params![new_format, docid, version, old_format],
        )?;
        Ok(())
    }

    /// Shift every version of a document by `delta`.
    pub fn shift_metadata_versions(&self, docid: i64, delta: i64) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        // Negate first so the primary key never collides mid-update.
        for table in ["bibdocmoreinfo", "bibdocfileflag"] {
            tx.execute(
                &format!("UPDATE {} SET version = -(version + ?1) WHERE id_bibdoc = ?2", table),
                params![delta, docid],
            )?;
            tx.execute(
                &format!("UPDATE {} SET version = -version WHERE id_bibdoc = ?1", table),
                params![docid],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Move all metadata of `from` onto `to`, keeping existing rows of `to`.
    pub fn copy_all_metadata(&self, from: i64, to: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO bibdocmoreinfo (id_bibdoc, version, format, comment, description)
             SELECT ?2, version, format, comment, description FROM bibdocmoreinfo WHERE id_bibdoc = ?1",
            params![from, to],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO bibdocfileflag (id_bibdoc, version, format, flag)
             SELECT ?2, version, format, flag FROM bibdocfileflag WHERE id_bibdoc = ?1",
            params![from, to],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_comment_description_flags() {
        let dir = tempdir().unwrap();
        let store = DocStore::new(&dir.path().join("test.db"), dir.path()).unwrap();

        store.set_comment(1, 1, ".pdf", Some("first draft")).unwrap();
        store.set_description(1, 1, ".pdf", Some("The paper")).unwrap();
        store.set_flag(1, 1, ".pdf", DocFlag::Stamped).unwrap();
        store.set_flag(1, 1, ".pdf", DocFlag::Stamped).unwrap();

        let metadata = store.get_file_metadata(1, 1, ".pdf").unwrap();
        assert_eq!(metadata.comment.as_deref(), Some("first draft"));
        assert_eq!(metadata.description.as_deref(), Some("The paper"));
        assert_eq!(metadata.flags.len(), 1);
        assert!(store.has_flag(1, 1, ".pdf", DocFlag::Stamped).unwrap());

        store.unset_flag(1, 1, ".pdf", DocFlag::Stamped).unwrap();
        store.set_comment(1, 1, ".pdf", None).unwrap();
        let metadata = store.get_file_metadata(1, 1, ".pdf").unwrap();
        assert_eq!(metadata.comment, None);
        assert_eq!(metadata.description.as_deref(), Some("The paper"));
        assert!(metadata.flags.is_empty());

        assert_eq!(store.get_file_metadata(1, 2, ".pdf").unwrap(), FileMetadata::default());
    }

    #[test]
    fn test_rename_and_shift() {
        let dir = tempdir().unwrap();
        let store = DocStore::new(&dir.path().join("test.db"), dir.path()).unwrap();

        store.set_comment(5, 0, ".ps", Some("zero")).unwrap();
        store.set_comment(5, 1, ".ps", Some("one")).unwrap();
        store.set_flag(5, 1, ".ps", DocFlag::Hidden).unwrap();

        store.shift_metadata_versions(5, 1).unwrap();
        store.rename_file_metadata(5, 2, ".ps", ".ps.gz").unwrap();

        let all = store.all_file_metadata(5).unwrap();
        assert_eq!(all[&(1, ".ps".to_string())].comment.as_deref(), Some("zero"));
        let moved = &all[&(2, ".ps.gz".to_string())];
        assert_eq!(moved.comment.as_deref(), Some("one"));
        assert!(moved.flags.contains(&DocFlag::Hidden));

        store.delete_file_metadata(5, 1, ".ps").unwrap();
        assert_eq!(store.all_file_metadata(5).unwrap().len(), 1);
    }
}
