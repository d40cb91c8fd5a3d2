//! Read-only view of one physical file of a document.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use axum::http::HeaderMap;
use axum::response::Response;
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::Serialize;

use super::flag::DocFlag;
use super::format::{get_subformat_from_format, get_superformat_from_format};
use crate::access::{check_bibdoc_authorization, Authorizer, UserInfo, DELETED_STATUS};
use crate::checksum::Md5Hasher;
use crate::error::{BibDocFileError, IoContext, Result};
use crate::stream::{stream_file, StreamOptions, StreamTarget};

/// Subformats matching this pattern mark icon renditions.
pub static ICON_SUBFORMAT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^icon").unwrap());

/// Default subformat given to icons.
pub const DEFAULT_ICON_SUBFORMAT: &str = "icon";

/// Comment, description and flags of one (format, version).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub comment: Option<String>,
    pub description: Option<String>,
    pub flags: BTreeSet<DocFlag>,
}

/// The document a file belongs to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileOwner {
    pub docid: i64,
    pub recid: Option<i64>,
    pub docname: String,
    pub doctype: String,
    pub status: String,
}

/// Size and timestamps, when already known from the fsinfo cache.
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: u64,
    pub creation_date: DateTime<Utc>,
    pub modification_date: DateTime<Utc>,
}

impl FileStat {
    /// Stat `path` on disk.
    pub fn read(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).at(path)?;
        let modification_date: DateTime<Utc> = metadata.modified().at(path)?.into();
        let creation_date = metadata
            .created()
            .map(DateTime::<Utc>::from)
            .unwrap_or(modification_date);
        Ok(Self {
            size: metadata.len(),
            creation_date,
            modification_date,
        })
    }
}

/// Guess the MIME type of a file from its superformat.
pub fn guess_mime(path: &Path, superformat: &str) -> String {
    let ext = superformat.rsplit('.').next().unwrap_or_default();
    if let Some(mime) = mime_guess::from_ext(ext).first() {
        return mime.to_string();
    }
    match infer::get_from_path(path) {
        Ok(Some(kind)) => kind.mime_type().to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// One stored file: a (document, format, version) triple.
#[derive(Debug, Clone, Serialize)]
pub struct BibDocFile {
    fullpath: PathBuf,
    owner: FileOwner,
    version: i64,
    format: String,
    superformat: String,
    subformat: String,
    checksum: String,
    size: u64,
    creation_date: DateTime<Utc>,
    modification_date: DateTime<Utc>,
    mime: String,
    comment: Option<String>,
    description: Option<String>,
    flags: Vec<DocFlag>,
    hidden: bool,
    latest: bool,
    etag: String,
    #[serde(skip)]
    hasher: Md5Hasher,
}

impl BibDocFile {
    /// Describe a stored file. Without `metadata` the comment, description
    /// and flags are empty. Without `stat` the file is stat-ed on disk.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fullpath: &Path,
        owner: &FileOwner,
        version: i64,
        format: &str,
        checksum: &str,
        metadata: Option<&FileMetadata>,
        stat: Option<FileStat>,
        hasher: Md5Hasher,
    ) -> Result<Self> {
        let stat = match stat {
            Some(stat) => stat,
            None => FileStat::read(fullpath)?,
        };
        let superformat = get_superformat_from_format(format).to_string();
        let subformat = get_subformat_from_format(format).to_string();
        let metadata = metadata.cloned().unwrap_or_default();
        let flags: Vec<DocFlag> = metadata.flags.iter().copied().collect();
        Ok(Self {
            fullpath: fullpath.to_path_buf(),
            owner: owner.clone(),
            version,
            mime: guess_mime(fullpath, &superformat),
            etag: format!("\"{}{}{}\"", owner.docid, format, version),
            format: format.to_string(),
            superformat,
            subformat,
            checksum: checksum.to_string(),
            size: stat.size,
            creation_date: stat.creation_date,
            modification_date: stat.modification_date,
            comment: metadata.comment,
            description: metadata.description,
            hidden: flags.contains(&DocFlag::Hidden),
            latest: true,
            flags,
            hasher,
        })
    }

    /// Mark whether this file belongs to the latest version of its document.
    pub fn with_latest(mut self, latest: bool) -> Self {
        self.latest = latest;
        self
    }

    pub fn get_full_path(&self) -> &Path {
        &self.fullpath
    }

    /// File name on disk, e.g. `paper.pdf;1`.
    pub fn get_file_name(&self) -> String {
        self.fullpath
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn get_bibdocid(&self) -> i64 {
        self.owner.docid
    }

    pub fn get_recid(&self) -> Option<i64> {
        self.owner.recid
    }

    pub fn get_name(&self) -> &str {
        &self.owner.docname
    }

    /// Name presented to users: document name plus superformat.
    pub fn get_full_name(&self) -> String {
        format!("{}{}", self.owner.docname, self.superformat)
    }

    pub fn get_type(&self) -> &str {
        &self.owner.doctype
    }

    pub fn get_status(&self) -> &str {
        &self.owner.status
    }

    pub fn get_version(&self) -> i64 {
        self.version
    }

    pub fn get_format(&self) -> &str {
        &self.format
    }

    pub fn get_superformat(&self) -> &str {
        &self.superformat
    }

    pub fn get_subformat(&self) -> &str {
        &self.subformat
    }

    pub fn get_checksum(&self) -> &str {
        &self.checksum
    }

    pub fn get_size(&self) -> u64 {
        self.size
    }

    pub fn get_mime(&self) -> &str {
        &self.mime
    }

    pub fn get_etag(&self) -> &str {
        &self.etag
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn modification_date(&self) -> DateTime<Utc> {
        self.modification_date
    }

    pub fn get_comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn get_flags(&self) -> &[DocFlag] {
        &self.flags
    }

    pub fn has_flag(&self, flag: DocFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_icon(&self) -> bool {
        ICON_SUBFORMAT_RE.is_match(&self.subformat)
    }

    /// Public URL of the file, relative to the site root. Older versions
    /// carry an explicit `version` parameter.
    pub fn get_url(&self) -> String {
        self.build_url(!self.latest)
    }

    /// Like `get_url` but pinned to this version.
    pub fn get_full_url(&self) -> String {
        self.build_url(true)
    }

    fn build_url(&self, with_version: bool) -> String {
        let mut url = format!(
            "/record/{}/files/{}{}",
            self.owner.recid.unwrap_or(0),
            urlencoding::encode(&self.owner.docname),
            self.superformat
        );
        let mut params = Vec::new();
        if !self.subformat.is_empty() {
            params.push(format!("subformat={}", urlencoding::encode(&self.subformat)));
        }
        if with_version {
            params.push(format!("version={}", self.version));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    /// Raw content of the file.
    pub fn get_content(&self) -> Result<Vec<u8>> {
        fs::read(&self.fullpath).at(&self.fullpath)
    }

    /// Recompute the checksum and compare it with the stored one.
    pub fn check(&self) -> Result<bool> {
        Ok(self.hasher.calculate(&self.fullpath)? == self.checksum)
    }

    /// True when `path`, stored as `format`, has the same format, size,
    /// checksum and bytes as this file. `format` must already be normalized.
    pub fn is_identical_to(&self, path: &Path, format: &str) -> Result<bool> {
        if format != self.format {
            return Ok(false);
        }
        let size = fs::metadata(path).at(path)?.len();
        if size != self.size {
            return Ok(false);
        }
        if self.hasher.calculate(path)? != self.checksum {
            return Ok(false);
        }
        let other = fs::read(path).at(path)?;
        Ok(other == self.get_content()?)
    }

    /// `(0, "")` when `user` may access the file, otherwise a positive code
    /// and the reason.
    pub fn is_restricted(&self, authorizer: &dyn Authorizer, user: &UserInfo) -> (i32, String) {
        match self.owner.status.as_str() {
            "" => (0, String::new()),
            DELETED_STATUS => (1, "File has been deleted".to_string()),
            status => check_bibdoc_authorization(authorizer, user, status),
        }
    }

    /// Build the HTTP response delivering this file.
    ///
    /// With probability `check_probability` the checksum is verified first.
    pub fn stream(
        &self,
        request: &HeaderMap,
        download: bool,
        check_probability: f64,
        options: &StreamOptions,
    ) -> Result<Response> {
        if !self.fullpath.exists() {
            return Err(BibDocFileError::NotFound(self.fullpath.display().to_string()));
        }
        if check_probability > 0.0 && rand::rng().random::<f64>() < check_probability && !self.check()? {
            return Err(BibDocFileError::Corrupted {
                name: self.get_full_name(),
                version: self.version,
            });
        }
        let fullname = self.get_full_name();
        let location = self.get_full_url();
        let target = StreamTarget {
            path: &self.fullpath,
            fullname: &fullname,
            mime: &self.mime,
            etag: Some(&self.etag),
            md5: Some(&self.checksum),
            location: &location,
            download,
        };
        stream_file(request, &target, options)
    }
}

impl fmt::Display for BibDocFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = format!(
            "{}:{}:{}:{}",
            self.owner.recid.unwrap_or(0),
            self.owner.docid,
            self.version,
            self.format
        );
        writeln!(f, "{}:fullpath={}", prefix, self.fullpath.display())?;
        writeln!(f, "{}:name={}", prefix, self.owner.docname)?;
        writeln!(f, "{}:subformat={}", prefix, self.subformat)?;
        writeln!(f, "{}:status={}", prefix, self.owner.status)?;
        writeln!(f, "{}:checksum={}", prefix, self.checksum)?;
        writeln!(f, "{}:size={}", prefix, self.size)?;
        writeln!(f, "{}:creation time={}", prefix, self.creation_date.to_rfc3339())?;
        writeln!(f, "{}:modification time={}", prefix, self.modification_date.to_rfc3339())?;
        writeln!(f, "{}:mime={}", prefix, self.mime)?;
        writeln!(f, "{}:url={}", prefix, self.get_url())?;
        writeln!(f, "{}:fullurl={}", prefix, self.get_full_url())?;
        writeln!(f, "{}:description={}", prefix, self.description.as_deref().unwrap_or(""))?;
        writeln!(f, "{}:comment={}", prefix, self.comment.as_deref().unwrap_or(""))?;
        writeln!(f, "{}:hidden={}", prefix, self.hidden)?;
        let flags: Vec<&str> = self.flags.iter().map(DocFlag::as_str).collect();
        writeln!(f, "{}:flags={}", prefix, flags.join(","))?;
        writeln!(f, "{}:etag={}", prefix, self.etag)
    }
}
