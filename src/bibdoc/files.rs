//! Adding, removing and annotating the files of a document.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use super::{BibDoc, BuildContext};
use crate::error::{BibDocFileError, IoContext, Result};
use crate::models::{
    with_implied_flags, BibDocFile, DocFlag, DEFAULT_ICON_SUBFORMAT, ICON_SUBFORMAT_RE,
};

/// Optional attributes of a file being added.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub description: Option<String>,
    pub comment: Option<String>,
    /// Explicit format; guessed from the source name when absent.
    pub format: Option<String>,
    pub flags: Vec<DocFlag>,
    /// Modification time to give the stored copy.
    pub modification_date: Option<DateTime<Utc>>,
}

impl FileOptions {
    /// Options carrying the metadata of an existing file forward.
    pub fn from_docfile(file: &BibDocFile) -> Self {
        Self {
            description: file.get_description().map(str::to_string),
            comment: file.get_comment().map(str::to_string),
            format: Some(file.get_format().to_string()),
            flags: file.get_flags().to_vec(),
            modification_date: None,
        }
    }
}

fn check_source(path: &Path) -> Result<()> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(BibDocFileError::NotFound(path.display().to_string())),
    };
    if metadata.len() == 0 {
        return Err(BibDocFileError::EmptyFile(path.to_path_buf()));
    }
    Ok(())
}

impl BibDoc {
    /// Store `path` as the next version. Returns the new version number.
    pub fn add_file_new_version(&mut self, path: &Path, options: &FileOptions) -> Result<i64> {
        let version = self.get_latest_version() + 1;
        let outcome = self
            .resolve_format(path, options)
            .and_then(|format| self.store_file(path, &format, version, options, true))
            .map(|_| version);
        self.finalize(BuildContext::Update, outcome)
    }

    /// Store `path` as an additional format of `version` (latest when
    /// `None`, 1 for an empty document or when 0 is given).
    pub fn add_file_new_format(&mut self, path: &Path, version: Option<i64>, options: &FileOptions) -> Result<i64> {
        let version = match version.unwrap_or_else(|| self.get_latest_version()) {
            0 => 1,
            v => v,
        };
        let outcome = self
            .resolve_format(path, options)
            .and_then(|format| self.store_file(path, &format, version, options, false))
            .map(|_| version);
        self.finalize(BuildContext::Update, outcome)
    }

    fn resolve_format(&self, path: &Path, options: &FileOptions) -> Result<String> {
        let formats = self.store.formats();
        let format = match &options.format {
            Some(format) => format.clone(),
            None => {
                let name = path.to_string_lossy();
                formats.decompose_file(&name, false, false).format
            }
        };
        Ok(formats.normalize_format(&format))
    }

    fn store_file(
        &self,
        path: &Path,
        format: &str,
        version: i64,
        options: &FileOptions,
        allow_hide_previous: bool,
    ) -> Result<()> {
        check_source(path)?;
        let exists_in_memory = self
            .docfiles
            .iter()
            .any(|f| f.get_format() == format && f.get_version() == version);
        let destination = self.get_file_path(format, version);
        if exists_in_memory || destination.exists() || self.store.fsinfo_exists(self.id, version, format)? {
            return Err(BibDocFileError::FormatExists {
                docid: self.id,
                format: format.to_string(),
                version,
            });
        }

        fs::create_dir_all(&self.basedir).at(&self.basedir)?;
        fs::copy(path, &destination).map_err(|e| {
            error!("Cannot copy {} to {}: {}", path.display(), destination.display(), e);
            BibDocFileError::io(&destination, e)
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&destination, fs::Permissions::from_mode(0o644)).at(&destination)?;
        }
        if let Some(modification_date) = options.modification_date {
            let file = fs::File::options().write(true).open(&destination).at(&destination)?;
            file.set_modified(modification_date.into()).at(&destination)?;
        }
        info!("Stored {} as {}", path.display(), destination.display());

        self.store_metadata(format, version, options, allow_hide_previous)
    }

    fn store_metadata(
        &self,
        format: &str,
        version: i64,
        options: &FileOptions,
        allow_hide_previous: bool,
    ) -> Result<()> {
        if let Some(description) = &options.description {
            self.store.set_description(self.id, version, format, Some(description))?;
        }
        if let Some(comment) = &options.comment {
            self.store.set_comment(self.id, version, format, Some(comment))?;
        }
        for flag in with_implied_flags(format, &options.flags) {
            if flag != DocFlag::PerformHidePrevious {
                self.store.set_flag(self.id, version, format, flag)?;
            } else if allow_hide_previous {
                for older in self.docfiles.iter().filter(|f| f.get_version() < version) {
                    self.store
                        .set_flag(self.id, older.get_version(), older.get_format(), DocFlag::Hidden)?;
                }
            }
        }
        Ok(())
    }

    fn remove_file(&self, format: &str, version: i64) -> Result<()> {
        let path = self.get_file_path(format, version);
        fs::remove_file(&path).map_err(|e| {
            error!("Cannot remove {}: {}", path.display(), e);
            BibDocFileError::io(&path, e)
        })?;
        self.store.delete_file_metadata(self.id, version, format)
    }

    /// Remove one physical file and its metadata.
    pub fn delete_file(&mut self, format: &str, version: i64) -> Result<()> {
        let format = self.store.formats().normalize_format(format);
        let outcome = match self.get_file(&format, Some(version), true) {
            Ok(_) => self.remove_file(&format, version),
            Err(e) => Err(e),
        };
        self.finalize(BuildContext::Update, outcome)
    }

    /// Remove every version older than the latest.
    pub fn purge(&mut self) -> Result<()> {
        let latest = self.get_latest_version();
        let stale: Vec<(String, i64)> = self
            .docfiles
            .iter()
            .filter(|f| f.get_version() < latest)
            .map(|f| (f.get_format().to_string(), f.get_version()))
            .collect();
        let outcome = stale
            .iter()
            .try_for_each(|(format, version)| self.remove_file(format, *version));
        self.finalize(BuildContext::Update, outcome)
    }

    /// Make the files of `version` the new latest version. Each file keeps
    /// its own comment, description and flags.
    pub fn revert(&mut self, version: i64) -> Result<i64> {
        let files: Vec<BibDocFile> = self
            .list_version_files(version, true)
            .into_iter()
            .cloned()
            .collect();
        let Some((first, rest)) = files.split_first() else {
            return Err(BibDocFileError::NotFound(format!(
                "version {} of document {}",
                version, self.docname
            )));
        };
        let new_version = self.add_file_new_version(first.get_full_path(), &FileOptions::from_docfile(first))?;
        for file in rest {
            self.add_file_new_format(file.get_full_path(), Some(new_version), &FileOptions::from_docfile(file))?;
        }
        Ok(new_version)
    }

    /// Rename the latest-version file of `old_format` to `new_format`.
    pub fn change_docformat(&mut self, old_format: &str, new_format: &str) -> Result<()> {
        let outcome = self.rename_format(old_format, new_format);
        self.finalize(BuildContext::Update, outcome)
    }

    fn rename_format(&self, old_format: &str, new_format: &str) -> Result<()> {
        let formats = self.store.formats();
        let old_format = formats.normalize_format(old_format);
        let new_format = formats.normalize_format(new_format);
        let latest = self.get_latest_version();
        self.get_file(&old_format, Some(latest), true)?;
        if self.get_file(&new_format, Some(latest), true).is_ok() {
            return Err(BibDocFileError::FormatExists {
                docid: self.id,
                format: new_format,
                version: latest,
            });
        }
        let from = self.get_file_path(&old_format, latest);
        let to = self.get_file_path(&new_format, latest);
        fs::rename(&from, &to).map_err(|e| {
            error!("Cannot rename {} to {}: {}", from.display(), to.display(), e);
            BibDocFileError::io(&from, e)
        })?;
        let mut index = self.checksum_index()?;
        index.rename(&file_name(&from), &file_name(&to))?;
        self.store.rename_file_metadata(self.id, latest, &old_format, &new_format)
    }

    /// Store an icon as a new format of the latest version.
    pub fn add_icon(&mut self, path: &Path, subformat: Option<&str>) -> Result<i64> {
        let formats = self.store.formats();
        let superformat = formats.decompose_file(&path.to_string_lossy(), false, false).format;
        let subformat = subformat.unwrap_or(DEFAULT_ICON_SUBFORMAT);
        let options = FileOptions {
            format: Some(format!("{};{}", superformat, subformat)),
            ..FileOptions::default()
        };
        self.add_file_new_format(path, None, &options)
    }

    /// Latest icon with `subformat`, or any icon subformat when `None`.
    pub fn get_icon(&self, subformat: Option<&str>) -> Option<&BibDocFile> {
        self.list_latest_files(true).into_iter().find(|f| match subformat {
            Some(subformat) => f.get_subformat() == subformat,
            None => f.is_icon(),
        })
    }

    /// Remove every version of the icons with `subformat` (all icon
    /// subformats when `None`).
    pub fn delete_icon(&mut self, subformat: Option<&str>) -> Result<()> {
        let icons: Vec<(String, i64)> = self
            .docfiles
            .iter()
            .filter(|f| match subformat {
                Some(subformat) => f.get_subformat() == subformat,
                None => ICON_SUBFORMAT_RE.is_match(f.get_subformat()),
            })
            .map(|f| (f.get_format().to_string(), f.get_version()))
            .collect();
        let outcome = icons
            .iter()
            .try_for_each(|(format, version)| self.remove_file(format, *version));
        self.finalize(BuildContext::Update, outcome)
    }

    fn metadata_version(&self, version: Option<i64>) -> i64 {
        version.unwrap_or_else(|| self.get_latest_version())
    }

    pub fn get_comment(&self, format: &str, version: Option<i64>) -> Result<Option<String>> {
        let format = self.store.formats().normalize_format(format);
        let version = self.metadata_version(version);
        Ok(self.store.get_file_metadata(self.id, version, &format)?.comment)
    }

    pub fn set_comment(&mut self, comment: Option<&str>, format: &str, version: Option<i64>) -> Result<()> {
        let format = self.store.formats().normalize_format(format);
        let version = self.metadata_version(version);
        let outcome = self.store.set_comment(self.id, version, &format, comment);
        self.finalize(BuildContext::Update, outcome)
    }

    pub fn get_description(&self, format: &str, version: Option<i64>) -> Result<Option<String>> {
        let format = self.store.formats().normalize_format(format);
        let version = self.metadata_version(version);
        Ok(self.store.get_file_metadata(self.id, version, &format)?.description)
    }

    pub fn set_description(&mut self, description: Option<&str>, format: &str, version: Option<i64>) -> Result<()> {
        let format = self.store.formats().normalize_format(format);
        let version = self.metadata_version(version);
        let outcome = self.store.set_description(self.id, version, &format, description);
        self.finalize(BuildContext::Update, outcome)
    }

    pub fn has_flag(&self, flag: DocFlag, format: &str, version: Option<i64>) -> Result<bool> {
        let format = self.store.formats().normalize_format(format);
        let version = self.metadata_version(version);
        self.store.has_flag(self.id, version, &format, flag)
    }

    pub fn set_flag(&mut self, flag: DocFlag, format: &str, version: Option<i64>) -> Result<()> {
        let format = self.store.formats().normalize_format(format);
        let version = self.metadata_version(version);
        let outcome = self.store.set_flag(self.id, version, &format, flag);
        self.finalize(BuildContext::Update, outcome)
    }

    pub fn unset_flag(&mut self, flag: DocFlag, format: &str, version: Option<i64>) -> Result<()> {
        let format = self.store.formats().normalize_format(format);
        let version = self.metadata_version(version);
        let outcome = self.store.unset_flag(self.id, version, &format, flag);
        self.finalize(BuildContext::Update, outcome)
    }

    pub fn hide(&mut self, format: &str, version: Option<i64>) -> Result<()> {
        self.set_flag(DocFlag::Hidden, format, version)
    }

    pub fn unhide(&mut self, format: &str, version: Option<i64>) -> Result<()> {
        self.unset_flag(DocFlag::Hidden, format, version)
    }

    pub fn hidden_p(&self, format: &str, version: Option<i64>) -> Result<bool> {
        self.has_flag(DocFlag::Hidden, format, version)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
