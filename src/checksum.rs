//! MD5 checksums and the per-directory `.md5` sidecar index.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use md5::{Digest, Md5};
use tracing::{debug, error, warn};

use crate::error::{BibDocFileError, IoContext, Result};

/// Name of the sidecar file listing checksums.
pub const MD5_SIDECAR: &str = ".md5";

/// Files at or above this size go to the external tool.
pub const DEFAULT_EXTERNAL_THRESHOLD: u64 = 256 * 1024;

const READ_BUFFER: usize = 1024 * 1024;

/// Computes MD5 digests in-process or through an external `md5sum`.
#[derive(Debug, Clone)]
pub struct Md5Hasher {
    external_threshold: u64,
    tool: Option<PathBuf>,
}

impl Default for Md5Hasher {
    fn default() -> Self {
        Self {
            external_threshold: DEFAULT_EXTERNAL_THRESHOLD,
            tool: None,
        }
    }
}

impl Md5Hasher {
    /// `tool` is looked up in PATH; a missing tool disables external hashing.
    pub fn new(external_threshold: u64, tool: Option<&str>) -> Self {
        let tool = tool.filter(|t| !t.is_empty()).and_then(|t| match which::which(t) {
            Ok(path) => Some(path),
            Err(_) => {
                debug!("{} not found in PATH, hashing in-process", t);
                None
            }
        });
        Self {
            external_threshold,
            tool,
        }
    }

    /// Hex MD5 digest of the file at `path`.
    pub fn calculate(&self, path: &Path) -> Result<String> {
        let size = fs::metadata(path).at(path)?.len();
        if let Some(tool) = &self.tool {
            if size >= self.external_threshold {
                match run_external(tool, path) {
                    Ok(digest) => return Ok(digest),
                    Err(e) => warn!("{}, falling back to internal md5", e),
                }
            }
        }
        calculate_md5_internal(path)
    }
}

/// Stream the file through an in-process MD5 digest.
pub fn calculate_md5_internal(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| {
        error!("Cannot open {} for hashing: {}", path.display(), e);
        BibDocFileError::io(path, e)
    })?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = file.read(&mut buf).map_err(|e| {
            error!("Cannot read {} for hashing: {}", path.display(), e);
            BibDocFileError::io(path, e)
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn run_external(tool: &Path, path: &Path) -> Result<String> {
    let tool_name = tool.display().to_string();
    let output = Command::new(tool)
        .arg("-b")
        .arg(path)
        .output()
        .map_err(|e| BibDocFileError::ToolFailed {
            tool: tool_name.clone(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(BibDocFileError::ToolFailed {
            tool: tool_name,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.get(..32) {
        Some(digest) if digest.chars().all(|c| c.is_ascii_hexdigit()) => {
            Ok(digest.to_ascii_lowercase())
        }
        _ => Err(BibDocFileError::ToolFailed {
            tool: tool_name,
            message: format!("unexpected output {:?}", stdout.trim()),
        }),
    }
}

/// Checksums of the files in one document directory.
///
/// The index is persisted as `<hash> *<filename>` lines in a hidden `.md5`
/// file inside the directory. Hidden files are never indexed.
#[derive(Debug)]
pub struct ChecksumIndex {
    folder: PathBuf,
    hasher: Md5Hasher,
    md5s: BTreeMap<String, String>,
}

impl ChecksumIndex {
    /// Open the index for `folder`, computing it if the sidecar is missing.
    pub fn open(folder: &Path, hasher: Md5Hasher) -> Result<Self> {
        let mut index = Self {
            folder: folder.to_path_buf(),
            hasher,
            md5s: BTreeMap::new(),
        };
        index.load()?;
        Ok(index)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Read the sidecar; compute and persist it when absent.
    pub fn load(&mut self) -> Result<()> {
        self.md5s.clear();
        let sidecar = self.folder.join(MD5_SIDECAR);
        if !sidecar.exists() {
            return self.update(true);
        }
        let contents = fs::read_to_string(&sidecar).at(&sidecar)?;
        for row in contents.lines() {
            let (Some(hash), Some(filename)) = (row.get(..32), row.get(34..)) else {
                continue;
            };
            let filename = filename.trim();
            if !filename.is_empty() {
                self.md5s.insert(filename.to_string(), hash.to_string());
            }
        }
        Ok(())
    }

    /// Hash files not yet indexed, or every file when `only_new` is false.
    pub fn update(&mut self, only_new: bool) -> Result<()> {
        if !only_new {
            self.md5s.clear();
        }
        if self.folder.exists() {
            let mut present = Vec::new();
            for entry in fs::read_dir(&self.folder).at(&self.folder)? {
                let entry = entry.at(&self.folder)?;
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') || !entry.path().is_file() {
                    continue;
                }
                if !self.md5s.contains_key(&name) {
                    let digest = self.hasher.calculate(&entry.path())?;
                    self.md5s.insert(name.clone(), digest);
                }
                present.push(name);
            }
            self.md5s.retain(|name, _| present.contains(name));
        }
        self.store()
    }

    /// Write the sidecar atomically.
    pub fn store(&self) -> Result<()> {
        if !self.folder.exists() {
            return Ok(());
        }
        let sidecar = self.folder.join(MD5_SIDECAR);
        let mut tmp = tempfile::Builder::new()
            .prefix(".md5.")
            .tempfile_in(&self.folder)
            .at(&self.folder)?;
        for (filename, hash) in &self.md5s {
            writeln!(tmp, "{} *{}", hash, filename).at(&sidecar)?;
        }
        tmp.persist(&sidecar).map_err(|e| {
            error!("Cannot store {}: {}", sidecar.display(), e.error);
            BibDocFileError::io(&sidecar, e.error)
        })?;
        Ok(())
    }

    /// Verify one indexed file, or every indexed file when `filename` is
    /// empty or unknown. Returns false on the first mismatch.
    pub fn check(&self, filename: &str) -> Result<bool> {
        if !filename.is_empty() {
            if let Some(expected) = self.md5s.get(filename) {
                let actual = self.hasher.calculate(&self.folder.join(filename))?;
                return Ok(&actual == expected);
            }
        }
        for (name, expected) in &self.md5s {
            let actual = self.hasher.calculate(&self.folder.join(name))?;
            if &actual != expected {
                warn!("Checksum mismatch for {}", self.folder.join(name).display());
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Stored checksum for `filename`, refreshing the index on a miss.
    pub fn get_checksum(&mut self, filename: &str) -> Result<String> {
        if let Some(hash) = self.md5s.get(filename) {
            return Ok(hash.clone());
        }
        self.update(true)?;
        self.md5s
            .get(filename)
            .cloned()
            .ok_or_else(|| BibDocFileError::NotFound(self.folder.join(filename).display().to_string()))
    }

    /// Move an entry after the file was renamed on disk.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if let Some(hash) = self.md5s.remove(from) {
            self.md5s.insert(to.to_string(), hash);
        }
        self.store()
    }

    pub fn len(&self) -> usize {
        self.md5s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.md5s.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_internal_md5() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            calculate_md5_internal(&path).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn test_index_persists_sidecar() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.pdf;1"), b"hello world").unwrap();
        fs::write(dir.path().join(".recid"), b"1").unwrap();

        let index = ChecksumIndex::open(dir.path(), Md5Hasher::default()).unwrap();
        assert_eq!(index.len(), 1);

        let sidecar = fs::read_to_string(dir.path().join(MD5_SIDECAR)).unwrap();
        assert_eq!(sidecar, "5eb63bbbe01eeed093cb22bb8f5acdc3 *a.pdf;1\n");
    }

    #[test]
    fn test_update_only_new_keeps_stale_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.pdf;1");
        fs::write(&path, b"first").unwrap();

        let mut index = ChecksumIndex::open(dir.path(), Md5Hasher::default()).unwrap();
        let before = index.get_checksum("a.pdf;1").unwrap();
        assert!(index.check("a.pdf;1").unwrap());

        fs::write(&path, b"second").unwrap();
        index.update(true).unwrap();
        assert_eq!(index.get_checksum("a.pdf;1").unwrap(), before);
        assert!(!index.check("").unwrap());

        index.update(false).unwrap();
        assert_ne!(index.get_checksum("a.pdf;1").unwrap(), before);
        assert!(index.check("").unwrap());
    }

    #[test]
    fn test_get_checksum_refreshes_on_miss() {
        let dir = tempdir().unwrap();
        let mut index = ChecksumIndex::open(dir.path(), Md5Hasher::default()).unwrap();
        assert!(index.is_empty());

        fs::write(dir.path().join("b.ps;1"), b"hello world").unwrap();
        assert_eq!(
            index.get_checksum("b.ps;1").unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert!(index.get_checksum("missing;1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_missing_tool_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big");
        fs::write(&path, b"hello world").unwrap();
        let hasher = Md5Hasher::new(0, Some("definitely-not-an-md5-tool"));
        assert_eq!(
            hasher.calculate(&path).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }
}
