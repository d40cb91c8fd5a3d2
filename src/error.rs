//! Error type shared by the document store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by documents, files and record collections.
#[derive(Debug, Error)]
pub enum BibDocFileError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{} seems to be empty", .0.display())]
    EmptyFile(PathBuf),

    #[error("format {format} already exists at version {version} of docid {docid}")]
    FormatExists {
        docid: i64,
        format: String,
        version: i64,
    },

    #[error("a document called {name} already exists for record {recid}")]
    NameCollision { recid: i64, name: String },

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("{0} is a reserved status and can not be set directly")]
    ReservedStatus(String),

    #[error("file {name}, version {version}, is corrupted")]
    Corrupted { name: String, version: i64 },

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl BibDocFileError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, BibDocFileError>;

/// Attach a path to `std::io::Result` values.
pub(crate) trait IoContext<T> {
    fn at(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| BibDocFileError::io(path, e))
    }
}
