//! Shared helpers for CLI commands: id ranges and document selection.

use std::collections::BTreeSet;
use std::str::FromStr;

use regex::Regex;

use crate::access::DELETED_STATUS;
use crate::models::DocFlag;
use crate::repository::DocStore;

/// A set of ids parsed from `1-3,5,9-7`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet(pub BTreeSet<i64>);

impl FromStr for IdSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| format!("invalid id {:?} in {:?}", v, s))
        };
        let mut ids = BTreeSet::new();
        for range in s.split(',').filter(|r| !r.trim().is_empty()) {
            match range.split_once('-') {
                Some((start, end)) => {
                    let (a, b) = (parse(start)?, parse(end)?);
                    ids.extend(a.min(b)..=a.max(b));
                }
                None => {
                    ids.insert(parse(range)?);
                }
            }
        }
        if ids.is_empty() {
            return Err(format!("no ids in {:?}", s));
        }
        Ok(IdSet(ids))
    }
}

/// Whether soft-deleted documents are matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DeletedDocs {
    Yes,
    #[default]
    No,
    Only,
}

/// Which documents a command works on.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub recids: Option<IdSet>,
    pub docids: Option<IdSet>,
    pub all: bool,
    pub docname: Option<String>,
    pub doctype: Option<String>,
    pub deleted: DeletedDocs,
}

impl Selection {
    /// Records matched by `--recids`, the records of `--docids`, or all.
    pub fn recids(&self, store: &DocStore) -> anyhow::Result<Vec<i64>> {
        if let Some(docids) = &self.docids {
            let mut recids = BTreeSet::new();
            for docid in &docids.0 {
                if let Some(recid) = store.get_recid(*docid)? {
                    recids.insert(recid);
                }
            }
            return Ok(recids.into_iter().collect());
        }
        if let Some(recids) = &self.recids {
            return Ok(recids.0.iter().copied().collect());
        }
        if self.all {
            return Ok(store.all_recids()?);
        }
        anyhow::bail!("No records selected: use --recids, --docids or --all")
    }

    /// The only matched record; fails when zero or several match.
    pub fn single_recid(&self, store: &DocStore) -> anyhow::Result<i64> {
        match self.recids(store)?.as_slice() {
            [recid] => Ok(*recid),
            [] => anyhow::bail!("No record matched"),
            many => anyhow::bail!("This action needs exactly one record, {} matched", many.len()),
        }
    }

    /// Documents matching every given criterion.
    pub fn docids(&self, store: &DocStore) -> anyhow::Result<Vec<i64>> {
        let candidates: Vec<i64> = match &self.docids {
            Some(docids) => docids.0.iter().copied().collect(),
            None => {
                let mut docids = Vec::new();
                for recid in self.recids(store)? {
                    docids.extend(store.record_docids(recid, true)?);
                }
                docids
            }
        };
        let pattern = self.docname.as_deref().map(wildcard_regex).transpose()?;

        let mut selected = Vec::new();
        for docid in candidates {
            let Some(row) = store.get_bibdoc_row(docid)? else {
                continue;
            };
            let deleted = row.status == DELETED_STATUS;
            let wanted = match self.deleted {
                DeletedDocs::Yes => true,
                DeletedDocs::No => !deleted,
                DeletedDocs::Only => deleted,
            };
            if !wanted {
                continue;
            }
            if let Some(doctype) = &self.doctype {
                if &row.doctype != doctype {
                    continue;
                }
            }
            if let Some(pattern) = &pattern {
                if !pattern.is_match(&row.docname) && !pattern.is_match(undeleted_name(&row.docname)) {
                    continue;
                }
            }
            selected.push(docid);
        }
        Ok(selected)
    }

    /// The only matched document; fails when zero or several match.
    pub fn single_docid(&self, store: &DocStore) -> anyhow::Result<i64> {
        match self.docids(store)?.as_slice() {
            [docid] => Ok(*docid),
            [] => anyhow::bail!("No document matched"),
            many => anyhow::bail!(
                "This action needs exactly one document, {} matched (narrow with --with-docname or --docids)",
                many.len()
            ),
        }
    }
}

/// `*` matches any run of characters; everything else is literal.
fn wildcard_regex(pattern: &str) -> anyhow::Result<Regex> {
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Ok(Regex::new(&format!("^{}$", escaped.join(".*")))?)
}

/// Name part of `DELETED-<stamp>-<name>`, or the name itself.
fn undeleted_name(docname: &str) -> &str {
    if docname.starts_with(crate::bibdoc::DELETED_PREFIX) {
        docname.splitn(3, '-').nth(2).unwrap_or(docname)
    } else {
        docname
    }
}

/// Parse `PDF/A,OCRED`.
pub fn parse_flags(flags: Option<&str>) -> anyhow::Result<Vec<DocFlag>> {
    let Some(flags) = flags else {
        return Ok(Vec::new());
    };
    flags
        .split(',')
        .filter(|f| !f.trim().is_empty())
        .map(|f| f.parse::<DocFlag>().map_err(anyhow::Error::msg))
        .collect()
}

/// Versions given as `1-2,4` or `ALL`. `None` means every version.
pub fn parse_versions(versions: Option<&str>) -> anyhow::Result<Option<BTreeSet<i64>>> {
    match versions {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("all") => Ok(None),
        Some(v) => Ok(Some(v.parse::<IdSet>().map_err(anyhow::Error::msg)?.0)),
    }
}

/// Print one `recid:docid:message` line.
pub fn print_info(recid: Option<i64>, docid: i64, message: &str) {
    let recid = recid.map(|r| r.to_string()).unwrap_or_default();
    println!("{}:{}:{}", recid, docid, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_ranges() {
        let ids: IdSet = "1-3,5,9-7".parse().unwrap();
        assert_eq!(ids.0.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 5, 7, 8, 9]);
        assert!("".parse::<IdSet>().is_err());
        assert!("1-x".parse::<IdSet>().is_err());
    }

    #[test]
    fn test_wildcards() {
        let re = wildcard_regex("*sam").unwrap();
        assert!(re.is_match("bigsam"));
        assert!(!re.is_match("sample"));
        assert!(wildcard_regex("a.b").unwrap().is_match("a.b"));
        assert!(!wildcard_regex("a.b").unwrap().is_match("axb"));
        assert_eq!(undeleted_name("DELETED-20240101000000000000-paper"), "paper");
    }

    #[test]
    fn test_parse_flags_and_versions() {
        assert_eq!(
            parse_flags(Some("PDF/A, ocred")).unwrap(),
            vec![DocFlag::PdfA, DocFlag::Ocred]
        );
        assert!(parse_flags(Some("BOGUS")).is_err());
        assert_eq!(parse_versions(Some("ALL")).unwrap(), None);
        assert_eq!(
            parse_versions(Some("1-2")).unwrap(),
            Some(BTreeSet::from([1, 2]))
        );
    }
}
