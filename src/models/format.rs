//! File name decomposition and format normalization.
//!
//! A stored file is named `<docname><format>;<version>` where the format is a
//! superformat extension (`.pdf`, `.tar.gz`) optionally followed by a
//! `;subformat` qualifier (`.gif;icon`). These helpers split names along those
//! boundaries using a table of known extensions.

use std::collections::HashSet;

use crate::error::{BibDocFileError, Result};

/// Extensions recognized without configuration.
const KNOWN_EXTENSIONS: &[&str] = &[
    ".a", ".ai", ".aif", ".aifc", ".aiff", ".au", ".avi", ".bat", ".bcpio", ".bin", ".bmp",
    ".bz2", ".c", ".cdf", ".cpio", ".csh", ".css", ".csv", ".djvu", ".dll", ".doc", ".docm",
    ".docx", ".dot", ".dvi", ".eml", ".eps", ".epub", ".etx", ".exe", ".gif", ".gtar", ".gz",
    ".h", ".hdf", ".hpg", ".htm", ".html", ".ico", ".ief", ".jpe", ".jpeg", ".jpg", ".js",
    ".json", ".ksh", ".latex", ".link", ".lis", ".llb", ".m1v", ".man", ".mat", ".me", ".mht",
    ".mhtml", ".mif", ".mov", ".movie", ".mp2", ".mp3", ".mp4", ".mpa", ".mpe", ".mpeg",
    ".mpg", ".mpp", ".ms", ".msg", ".nc", ".nws", ".o", ".obj", ".oda", ".odp", ".ods", ".odt",
    ".ogg", ".p12", ".p7c", ".pbm", ".pdf", ".pfx", ".pgm", ".pl", ".png", ".pnm", ".pot",
    ".ppa", ".ppm", ".pps", ".ppsm", ".ppsx", ".ppt", ".pptm", ".pptx", ".ps", ".pwz", ".py",
    ".pyc", ".pyo", ".qt", ".ra", ".ram", ".ras", ".rdf", ".rgb", ".roff", ".rtf", ".rtx",
    ".sgm", ".sgml", ".sh", ".shar", ".snd", ".so", ".src", ".sv4cpio", ".sv4crc", ".svg",
    ".swf", ".t", ".tar", ".tbz2", ".tcl", ".tex", ".texi", ".texinfo", ".tgz", ".tif",
    ".tiff", ".tr", ".tsv", ".txt", ".ustar", ".vcf", ".wav", ".webm", ".webp", ".wiz",
    ".wsdl", ".xbm", ".xlb", ".xls", ".xlsb", ".xlsm", ".xlsx", ".xml", ".xpdl", ".xpm",
    ".xsl", ".xwd", ".xul", ".z", ".zip",
];

/// Superformats that keep their case under strong normalization.
const CASE_SENSITIVE_FORMATS: &[&str] = &[".Z", ".H", ".C", ".CC"];

/// A path split into directory, document name and format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecomposedFile {
    pub dirname: String,
    pub base: String,
    pub format: String,
}

/// Extension table and normalization policy.
#[derive(Debug, Clone)]
pub struct FormatRules {
    extensions: HashSet<String>,
    strong_normalization: bool,
}

impl Default for FormatRules {
    fn default() -> Self {
        Self::new(&[], false)
    }
}

impl FormatRules {
    pub fn new(additional_extensions: &[String], strong_normalization: bool) -> Self {
        let mut extensions: HashSet<String> =
            KNOWN_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        for ext in additional_extensions {
            let ext = ext.trim().to_ascii_lowercase();
            if ext.is_empty() {
                continue;
            }
            if ext.starts_with('.') {
                extensions.insert(ext);
            } else {
                extensions.insert(format!(".{}", ext));
            }
        }
        Self {
            extensions,
            strong_normalization,
        }
    }

    /// Normalize a format: ensure the leading dot and keep the subformat.
    pub fn normalize_format(&self, format: &str) -> String {
        if format.is_empty() {
            return String::new();
        }
        let (superformat, subformat) = match format.rfind(';') {
            Some(idx) => (&format[..idx], &format[idx..]),
            None => (format, ""),
        };
        let mut superformat = if !superformat.is_empty() && !superformat.starts_with('.') {
            format!(".{}", superformat)
        } else {
            superformat.to_string()
        };
        if self.strong_normalization {
            if !CASE_SENSITIVE_FORMATS.contains(&superformat.as_str()) {
                superformat = superformat.to_lowercase();
            }
            superformat = match superformat.as_str() {
                ".jpg" => ".jpeg".to_string(),
                ".htm" => ".html".to_string(),
                ".tif" => ".tiff".to_string(),
                _ => superformat,
            };
        }
        format!("{}{}", superformat, subformat)
    }

    /// Strip one known extension from the end of `name`, if any.
    fn strip_known_once<'a>(&self, name: &'a str) -> &'a str {
        let lower = name.to_ascii_lowercase();
        let mut best: Option<usize> = None;
        for ext in &self.extensions {
            if lower.ends_with(ext.as_str()) && best.map_or(true, |len| ext.len() > len) {
                best = Some(ext.len());
            }
        }
        match best {
            Some(len) => &name[..name.len() - len],
            None => name,
        }
    }

    /// Strip the extension (and any `;...` suffix) from a file name.
    ///
    /// Known extensions are stripped repeatedly so that `foo.tar.gz` becomes
    /// `foo`. When nothing known is found and `only_known` is false, the
    /// last dotted suffix is removed instead.
    pub fn file_strip_ext<'a>(&self, afile: &'a str, only_known: bool) -> &'a str {
        let mut current = afile.split(';').next().unwrap_or(afile);
        let mut next = self.strip_known_once(current);
        if next == current && !only_known {
            next = split_ext(current);
        }
        while next != current {
            current = next;
            next = self.strip_known_once(current);
        }
        next
    }

    /// Split `afile` into directory, base name and format.
    pub fn decompose_file(&self, afile: &str, skip_version: bool, only_known: bool) -> DecomposedFile {
        let mut afile = afile;
        if skip_version {
            if let Some((rest, version)) = afile.rsplit_once(';') {
                if version.parse::<i64>().is_ok() {
                    afile = rest;
                }
            }
        }
        let (dirname, basename) = split_dirname(afile);
        let base = self.file_strip_ext(basename, only_known);
        let format = extension_after(basename, base);
        DecomposedFile {
            dirname: dirname.to_string(),
            base: base.to_string(),
            format,
        }
    }

    /// Split a versioned file name (`name.ext;3`) into its parts.
    pub fn decompose_file_with_version(&self, afile: &str) -> Result<(DecomposedFile, i64)> {
        let (rest, version) = afile
            .rsplit_once(';')
            .ok_or_else(|| BibDocFileError::InvalidName(format!("{} has no version", afile)))?;
        let version: i64 = version.parse().map_err(|_| {
            BibDocFileError::InvalidName(format!(
                "{} must end with ';' followed by an integer version",
                afile
            ))
        })?;
        let (dirname, basename) = split_dirname(rest);
        let base = self.file_strip_ext(basename, false);
        let format = extension_after(basename, base);
        Ok((
            DecomposedFile {
                dirname: dirname.to_string(),
                base: base.to_string(),
                format,
            },
            version,
        ))
    }
}

/// Everything before the last `;`, or the whole format.
pub fn get_superformat_from_format(format: &str) -> &str {
    match format.rfind(';') {
        Some(idx) => &format[..idx],
        None => format,
    }
}

/// Everything after the last `;`, or an empty string.
pub fn get_subformat_from_format(format: &str) -> &str {
    match format.rfind(';') {
        Some(idx) => &format[idx + 1..],
        None => "",
    }
}

/// Suggest the next candidate name: `foo` -> `foo_1`, `foo_1` -> `foo_2`.
pub fn propose_next_docname(docname: &str) -> String {
    if let Some((prefix, counter)) = docname.rsplit_once('_') {
        if let Ok(n) = counter.parse::<u64>() {
            return format!("{}_{}", prefix, n + 1);
        }
    }
    format!("{}_1", docname)
}

/// Build a file name following the `<name><format>;<version>` convention.
pub fn versioned_file_name(docname: &str, format: &str, version: i64) -> String {
    format!("{}{};{}", docname, format, version)
}

fn split_dirname(afile: &str) -> (&str, &str) {
    match afile.rfind('/') {
        Some(idx) => (&afile[..idx], &afile[idx + 1..]),
        None => ("", afile),
    }
}

fn extension_after(basename: &str, base: &str) -> String {
    match basename.get(base.len() + 1..) {
        Some(ext) if !ext.is_empty() => format!(".{}", ext),
        _ => String::new(),
    }
}

/// Remove the last dotted suffix, ignoring leading dots.
fn split_ext(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if name[..idx].chars().any(|c| c != '.') => &name[..idx],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_strip_ext() {
        let rules = FormatRules::default();
        assert_eq!(rules.file_strip_ext("foo.tar.gz", false), "foo");
        assert_eq!(rules.file_strip_ext("foo.buz.gz", false), "foo.buz");
        assert_eq!(rules.file_strip_ext("foo.buz", false), "foo");
        assert_eq!(rules.file_strip_ext("foo.buz", true), "foo.buz");
        assert_eq!(rules.file_strip_ext("foo.gif;icon", false), "foo");
        assert_eq!(rules.file_strip_ext("Paper.PDF", true), "Paper");
    }

    #[test]
    fn test_additional_extensions() {
        let rules = FormatRules::new(&["buz".to_string()], false);
        assert_eq!(rules.file_strip_ext("foo.buz", true), "foo");
    }

    #[test]
    fn test_decompose_file() {
        let rules = FormatRules::default();
        let parts = rules.decompose_file("/tmp/foo.tar.gz", false, false);
        assert_eq!(parts.dirname, "/tmp");
        assert_eq!(parts.base, "foo");
        assert_eq!(parts.format, ".tar.gz");

        let parts = rules.decompose_file("/tmp/foo.tar.gz;1", true, false);
        assert_eq!(parts.format, ".tar.gz");

        let parts = rules.decompose_file("http://www.example.org/index.html", false, false);
        assert_eq!(parts.dirname, "http://www.example.org");
        assert_eq!(parts.base, "index");
        assert_eq!(parts.format, ".html");

        let parts = rules.decompose_file("thumb.gif;icon", false, false);
        assert_eq!(parts.base, "thumb");
        assert_eq!(parts.format, ".gif;icon");
    }

    #[test]
    fn test_decompose_file_with_version() {
        let rules = FormatRules::default();
        let (parts, version) = rules.decompose_file_with_version("/tmp/foo.tar.gz;1").unwrap();
        assert_eq!(parts.base, "foo");
        assert_eq!(parts.format, ".tar.gz");
        assert_eq!(version, 1);

        let (parts, version) = rules.decompose_file_with_version("paper.gif;icon;3").unwrap();
        assert_eq!(parts.base, "paper");
        assert_eq!(parts.format, ".gif;icon");
        assert_eq!(version, 3);

        assert!(rules.decompose_file_with_version("paper.pdf").is_err());
        assert!(rules.decompose_file_with_version("paper.pdf;x").is_err());
    }

    #[test]
    fn test_normalize_format() {
        let rules = FormatRules::default();
        assert_eq!(rules.normalize_format(""), "");
        assert_eq!(rules.normalize_format("pdf"), ".pdf");
        assert_eq!(rules.normalize_format(".pdf"), ".pdf");
        assert_eq!(rules.normalize_format("gif;icon"), ".gif;icon");
        assert_eq!(rules.normalize_format("JPG"), ".JPG");

        let strong = FormatRules::new(&[], true);
        assert_eq!(strong.normalize_format("JPG"), ".jpeg");
        assert_eq!(strong.normalize_format("htm;icon"), ".html;icon");
        assert_eq!(strong.normalize_format(".Z"), ".Z");
    }

    #[test]
    fn test_super_and_subformat() {
        assert_eq!(get_superformat_from_format(".gif;icon"), ".gif");
        assert_eq!(get_subformat_from_format(".gif;icon"), "icon");
        assert_eq!(get_superformat_from_format(".pdf"), ".pdf");
        assert_eq!(get_subformat_from_format(".pdf"), "");
    }

    #[test]
    fn test_propose_next_docname() {
        assert_eq!(propose_next_docname("foo"), "foo_1");
        assert_eq!(propose_next_docname("foo_1"), "foo_2");
        assert_eq!(propose_next_docname("foo_10"), "foo_11");
        assert_eq!(propose_next_docname("foo_bar"), "foo_bar_1");
    }
}
