//! Data models for bibdocfile.

mod docfile;
mod flag;
mod format;

pub use docfile::{
    guess_mime, BibDocFile, FileMetadata, FileOwner, FileStat, DEFAULT_ICON_SUBFORMAT,
    ICON_SUBFORMAT_RE,
};
pub use flag::{with_implied_flags, DocFlag};
pub use format::{
    get_subformat_from_format, get_superformat_from_format, propose_next_docname,
    versioned_file_name, DecomposedFile, FormatRules,
};
