//! Per-file flags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::format::get_subformat_from_format;

/// Flags that can be attached to a (format, version) of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocFlag {
    #[serde(rename = "PDF/A")]
    PdfA,
    #[serde(rename = "STAMPED")]
    Stamped,
    #[serde(rename = "PDFOPT")]
    PdfOpt,
    #[serde(rename = "HIDDEN")]
    Hidden,
    #[serde(rename = "CONVERTED")]
    Converted,
    /// Request flag: hide all older versions when adding a new one. Never stored.
    #[serde(rename = "PERFORM_HIDE_PREVIOUS")]
    PerformHidePrevious,
    #[serde(rename = "OCRED")]
    Ocred,
}

impl DocFlag {
    pub const ALL: [DocFlag; 7] = [
        DocFlag::PdfA,
        DocFlag::Stamped,
        DocFlag::PdfOpt,
        DocFlag::Hidden,
        DocFlag::Converted,
        DocFlag::PerformHidePrevious,
        DocFlag::Ocred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdfA => "PDF/A",
            Self::Stamped => "STAMPED",
            Self::PdfOpt => "PDFOPT",
            Self::Hidden => "HIDDEN",
            Self::Converted => "CONVERTED",
            Self::PerformHidePrevious => "PERFORM_HIDE_PREVIOUS",
            Self::Ocred => "OCRED",
        }
    }
}

impl fmt::Display for DocFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocFlag::ALL
            .iter()
            .find(|flag| flag.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown flag: {}", s))
    }
}

/// Add `PDF/A` when the format carries a `pdfa` subformat.
pub fn with_implied_flags(format: &str, flags: &[DocFlag]) -> Vec<DocFlag> {
    let mut flags = flags.to_vec();
    let is_pdfa = get_subformat_from_format(format)
        .split(';')
        .any(|sub| sub == "pdfa");
    if is_pdfa && !flags.contains(&DocFlag::PdfA) {
        flags.push(DocFlag::PdfA);
    }
    flags
}
