use rusqlite::Connection;

use crate::error::Result;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS bibdoc (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            status TEXT NOT NULL DEFAULT '',
            docname TEXT NOT NULL,
            creation_date TEXT NOT NULL,
            modification_date TEXT NOT NULL,
            doctype TEXT NOT NULL DEFAULT 'Main'
        );
        CREATE INDEX IF NOT EXISTS idx_bibdoc_docname ON bibdoc(docname);

        CREATE TABLE IF NOT EXISTS bibrec_bibdoc (
            id_bibrec INTEGER NOT NULL,
            id_bibdoc INTEGER NOT NULL,
            type TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (id_bibrec, id_bibdoc)
        );
        CREATE INDEX IF NOT EXISTS idx_bibrec_bibdoc_doc ON bibrec_bibdoc(id_bibdoc);

        CREATE TABLE IF NOT EXISTS bibdoc_bibdoc (
            id_bibdoc1 INTEGER NOT NULL,
            id_bibdoc2 INTEGER NOT NULL,
            type TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (id_bibdoc1, id_bibdoc2, type)
        );

        CREATE TABLE IF NOT EXISTS bibdocfsinfo (
            id_bibdoc INTEGER NOT NULL,
            version INTEGER NOT NULL,
            format TEXT NOT NULL,
            last_version INTEGER NOT NULL DEFAULT 0,
            cd TEXT NOT NULL,
            md TEXT NOT NULL,
            checksum TEXT NOT NULL,
            filesize INTEGER NOT NULL,
            mime TEXT NOT NULL,
            PRIMARY KEY (id_bibdoc, version, format)
        );
        CREATE INDEX IF NOT EXISTS idx_bibdocfsinfo_last ON bibdocfsinfo(last_version);

        CREATE TABLE IF NOT EXISTS bibdocmoreinfo (
            id_bibdoc INTEGER NOT NULL,
            version INTEGER NOT NULL,
            format TEXT NOT NULL,
            comment TEXT,
            description TEXT,
            PRIMARY KEY (id_bibdoc, version, format)
        );

        CREATE TABLE IF NOT EXISTS bibdocfileflag (
            id_bibdoc INTEGER NOT NULL,
            version INTEGER NOT NULL,
            format TEXT NOT NULL,
            flag TEXT NOT NULL,
            PRIMARY KEY (id_bibdoc, version, format, flag)
        );

        CREATE TABLE IF NOT EXISTS hstDOCUMENT (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            id_bibdoc INTEGER NOT NULL,
            docname TEXT NOT NULL DEFAULT '',
            docformat TEXT NOT NULL DEFAULT '',
            docversion INTEGER NOT NULL DEFAULT 0,
            docsize INTEGER NOT NULL DEFAULT 0,
            docchecksum TEXT NOT NULL DEFAULT '',
            doctimestamp TEXT NOT NULL,
            action TEXT NOT NULL,
            statuscode TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_hstdocument_bibdoc ON hstDOCUMENT(id_bibdoc, doctimestamp);
    "#,
    )?;
    Ok(())
}
