//! bibdocfile - versioned document and file store for digital library records.
//!
//! Records own named documents; each document keeps every version of every
//! format of its content in one directory, with metadata, restriction status
//! and an audit trail in SQLite.

pub mod access;
pub mod bibdoc;
pub mod bibrecdocs;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod server;
pub mod stream;

pub use bibdoc::{BibDoc, FileOptions};
pub use bibrecdocs::BibRecDocs;
pub use error::{BibDocFileError, Result};
pub use repository::DocStore;
