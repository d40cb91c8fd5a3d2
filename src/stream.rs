//! HTTP delivery of stored files.
//!
//! Implements conditional GET (`If-Match`, `If-None-Match`,
//! `If-Modified-Since`, `Unless-Modified-Since`), byte ranges with `If-Range`
//! and optional delegation to a front-end server through `X-Sendfile`.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use tracing::{error, warn};

use crate::error::{IoContext, Result};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Server-wide streaming switches.
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    pub use_xsendfile: bool,
    pub enable_range_requests: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            use_xsendfile: false,
            enable_range_requests: true,
        }
    }
}

/// What to stream and how to describe it.
#[derive(Debug, Clone)]
pub struct StreamTarget<'a> {
    pub path: &'a Path,
    /// Name presented to the client in `Content-Disposition`.
    pub fullname: &'a str,
    pub mime: &'a str,
    pub etag: Option<&'a str>,
    /// Hex MD5 of the content.
    pub md5: Option<&'a str>,
    pub location: &'a str,
    pub download: bool,
}

/// A parsed `Range` entry; `None` marks an open end.
type ByteRange = (Option<u64>, Option<u64>);

/// Parse `bytes=20-30,40-,-80`. Returns `None` for malformed headers.
pub fn parse_ranges(value: &str) -> Option<Vec<ByteRange>> {
    let value = value.trim();
    if !value.starts_with("bytes") {
        return None;
    }
    let (_, spec) = value.split_once('=')?;
    let mut ranges = Vec::new();
    for range in spec.trim().split(',') {
        let range = range.trim();
        if let Some(suffix) = range.strip_prefix('-') {
            ranges.push((None, Some(suffix.parse().ok()?)));
        } else if let Some(prefix) = range.strip_suffix('-') {
            ranges.push((Some(prefix.parse().ok()?), None));
        } else {
            let (first, last) = range.split_once('-')?;
            ranges.push((Some(first.parse().ok()?), Some(last.parse().ok()?)));
        }
    }
    Some(ranges)
}

/// Turn parsed ranges into satisfiable `(start, length)` pairs for `size`.
pub fn fix_ranges(ranges: &[ByteRange], size: u64) -> Vec<(u64, u64)> {
    let mut fixed = Vec::new();
    for range in ranges {
        let (start, len) = match *range {
            (None, Some(suffix)) if suffix > 0 => (size.saturating_sub(suffix), suffix),
            (Some(first), None) if first < size => (first, size - first),
            (Some(first), Some(last)) if first < size && last >= first => {
                (first, last.min(size - 1) - first + 1)
            }
            _ => continue,
        };
        let len = len.min(size - start);
        if len > 0 {
            fixed.push((start, len));
        }
    }
    fixed
}

/// Parse an HTTP date in RFC 1123, RFC 850 or asctime form.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.split(';').next()?.trim();
    let formats = [HTTP_DATE, "%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_tags(value: &str) -> Vec<String> {
    value.split(',').map(|tag| tag.trim().to_string()).collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_bytes(value.as_bytes()) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => warn!("Dropping unrepresentable {} header: {:?}", name, value),
    }
}

fn content_disposition(target: &StreamTarget<'_>) -> String {
    let kind = if target.download { "attachment" } else { "inline" };
    format!(
        "{}; filename=\"{}\"",
        kind,
        target.fullname.replace('"', "\\\"")
    )
}

fn content_md5(md5: &str) -> Option<String> {
    let raw = hex::decode(md5).ok()?;
    Some(base64::engine::general_purpose::STANDARD.encode(raw))
}

/// Build the response for `target` given the request `headers`.
pub fn stream_file(
    request: &HeaderMap,
    target: &StreamTarget<'_>,
    options: &StreamOptions,
) -> Result<Response> {
    let mut headers = HeaderMap::new();

    if options.use_xsendfile {
        if !target.path.exists() {
            return Ok(StatusCode::NOT_FOUND.into_response());
        }
        set_header(&mut headers, header::CONTENT_DISPOSITION, &content_disposition(target));
        set_header(&mut headers, HeaderName::from_static("x-sendfile"), &target.path.display().to_string());
        set_header(&mut headers, header::CONTENT_TYPE, target.mime);
        return Ok((StatusCode::OK, headers).into_response());
    }

    if let Some(if_match) = header_str(request, header::IF_MATCH) {
        if let Some(etag) = target.etag {
            if !parse_tags(if_match).iter().any(|t| t == etag) {
                return Ok(StatusCode::PRECONDITION_FAILED.into_response());
            }
        }
    }

    let Ok(metadata) = fs::metadata(target.path) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let mtime: DateTime<Utc> = metadata.modified().at(target.path)?.into();
    let mtime_secs = mtime.timestamp();
    let size = metadata.len();

    set_header(&mut headers, header::CONTENT_TYPE, target.mime);
    set_header(&mut headers, header::LAST_MODIFIED, &mtime.format(HTTP_DATE).to_string());
    set_header(
        &mut headers,
        header::ACCEPT_RANGES,
        if options.enable_range_requests { "bytes" } else { "none" },
    );
    set_header(&mut headers, header::CONTENT_LOCATION, target.location);
    if let Some(etag) = target.etag {
        set_header(&mut headers, header::ETAG, etag);
    }
    if let Some(md5) = target.md5.and_then(content_md5) {
        set_header(&mut headers, HeaderName::from_static("content-md5"), &md5);
    }
    set_header(&mut headers, header::CONTENT_DISPOSITION, &content_disposition(target));

    if size == 0 {
        error!("{} exists but is empty", target.path.display());
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    if let Some(since) = header_str(request, header::IF_MODIFIED_SINCE).and_then(parse_http_date) {
        if since.timestamp() >= mtime_secs {
            return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
        }
    }
    if let (Some(if_none_match), Some(etag)) = (header_str(request, header::IF_NONE_MATCH), target.etag) {
        if parse_tags(if_none_match).iter().any(|t| t == etag) {
            return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
        }
    }
    let unless_modified = HeaderName::from_static("unless-modified-since");
    if let Some(unless) = header_str(request, unless_modified).and_then(parse_http_date) {
        if unless.timestamp() < mtime_secs {
            return full_response(target, headers);
        }
    }

    if !options.enable_range_requests {
        return full_response(target, headers);
    }
    let Some(ranges) = header_str(request, header::RANGE).and_then(parse_ranges) else {
        return full_response(target, headers);
    };
    if let Some(if_range) = header_str(request, header::IF_RANGE) {
        let matches = target
            .etag
            .is_some_and(|etag| parse_tags(if_range).iter().any(|t| t == etag));
        if !matches {
            return full_response(target, headers);
        }
    }

    let ranges = fix_ranges(&ranges, size);
    match ranges.len() {
        0 => {
            set_header(&mut headers, header::CONTENT_RANGE, &format!("bytes */{}", size));
            Ok((StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response())
        }
        1 => {
            let (start, len) = ranges[0];
            let body = read_range(target.path, start, len)?;
            set_header(
                &mut headers,
                header::CONTENT_RANGE,
                &format!("bytes {}-{}/{}", start, start + len - 1, size),
            );
            Ok((StatusCode::PARTIAL_CONTENT, headers, Body::from(body)).into_response())
        }
        _ => multiple_ranges(target, headers, &ranges, size),
    }
}

fn full_response(target: &StreamTarget<'_>, headers: HeaderMap) -> Result<Response> {
    let content = fs::read(target.path).at(target.path)?;
    Ok((StatusCode::OK, headers, Body::from(content)).into_response())
}

fn read_range(path: &Path, start: u64, len: u64) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path).at(path)?;
    file.seek(SeekFrom::Start(start)).at(path)?;
    let mut buf = Vec::with_capacity(len as usize);
    file.take(len).read_to_end(&mut buf).at(path)?;
    Ok(buf)
}

fn multiple_ranges(
    target: &StreamTarget<'_>,
    mut headers: HeaderMap,
    ranges: &[(u64, u64)],
    size: u64,
) -> Result<Response> {
    let boundary = format!(
        "THIS_STRING_SEPARATES_{}{:04}",
        Utc::now().format("%Y%m%d%H%M%S"),
        rand::rng().random_range(0..10000)
    );
    let mut body = Vec::new();
    for &(start, len) in ranges {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n", target.mime).as_bytes());
        body.extend_from_slice(
            format!("Content-Range: bytes {}-{}/{}\r\n", start, start + len - 1, size).as_bytes(),
        );
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&read_range(target.path, start, len)?);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    set_header(
        &mut headers,
        header::CONTENT_TYPE,
        &format!("multipart/byteranges; boundary={}", boundary),
    );
    Ok((StatusCode::PARTIAL_CONTENT, headers, Body::from(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn target<'a>(path: &'a Path) -> StreamTarget<'a> {
        StreamTarget {
            path,
            fullname: "paper.pdf",
            mime: "application/pdf",
            etag: Some("\"1.pdf1\""),
            md5: Some("5eb63bbbe01eeed093cb22bb8f5acdc3"),
            location: "/record/1/files/paper.pdf",
            download: false,
        }
    }

    fn request(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_parse_ranges() {
        assert_eq!(
            parse_ranges("bytes=20-30,40-,-80").unwrap(),
            vec![(Some(20), Some(30)), (Some(40), None), (None, Some(80))]
        );
        assert!(parse_ranges("items=1-2").is_none());
        assert!(parse_ranges("bytes=a-b").is_none());
    }

    #[test]
    fn test_fix_ranges() {
        let ranges = parse_ranges("bytes=0-3,8-,-2,50-60,5-2").unwrap();
        assert_eq!(fix_ranges(&ranges, 11), vec![(0, 4), (8, 3), (9, 2)]);
        let ranges = parse_ranges("bytes=-100").unwrap();
        assert_eq!(fix_ranges(&ranges, 11), vec![(0, 11)]);
        assert_eq!(fix_ranges(&[(Some(0), Some(u64::MAX))], 10), vec![(0, 10)]);
        let ranges = parse_ranges("bytes=4-18446744073709551615").unwrap();
        assert_eq!(fix_ranges(&ranges, 10), vec![(4, 6)]);
    }

    #[test]
    fn test_parse_http_date() {
        let date = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(date.timestamp(), 784111777);
        let date = parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT; length=12").unwrap();
        assert_eq!(date.timestamp(), 784111777);
        assert!(parse_http_date("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_full_and_conditional_responses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paper.pdf;1");
        fs::write(&path, b"hello world").unwrap();
        let target = target(&path);
        let options = StreamOptions::default();

        let response = stream_file(&HeaderMap::new(), &target, &options).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "inline; filename=\"paper.pdf\""
        );
        assert_eq!(response.headers()["content-md5"], "XrY7u+Ae7tCTyyK7j1rNww==");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello world");

        let response = stream_file(&request(&[("if-none-match", "\"1.pdf1\"")]), &target, &options).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        let response = stream_file(&request(&[("if-match", "\"other\"")]), &target, &options).unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

        let future = "Fri, 01 Jan 2100 00:00:00 GMT";
        let response = stream_file(&request(&[("if-modified-since", future)]), &target, &options).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_range_responses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paper.pdf;1");
        fs::write(&path, b"hello world").unwrap();
        let target = target(&path);
        let options = StreamOptions::default();

        let response = stream_file(&request(&[("range", "bytes=0-4")]), &target, &options).unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-4/11");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello");

        let response = stream_file(&request(&[("range", "bytes=0-1,-2")]), &target, &options).unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("multipart/byteranges; boundary="));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("Content-Range: bytes 0-1/11\r\n\r\nhe\r\n"));
        assert!(body.contains("Content-Range: bytes 9-10/11\r\n\r\nld\r\n"));

        let response = stream_file(&request(&[("range", "bytes=50-60")]), &target, &options).unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

        let response = stream_file(
            &request(&[("range", "bytes=0-4"), ("if-range", "\"stale\"")]),
            &target,
            &options,
        )
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_missing_and_empty_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        let response = stream_file(&HeaderMap::new(), &target(&missing), &StreamOptions::default()).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let empty = dir.path().join("empty");
        fs::write(&empty, b"").unwrap();
        let response = stream_file(&HeaderMap::new(), &target(&empty), &StreamOptions::default()).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_xsendfile_delegates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paper.pdf;1");
        fs::write(&path, b"hello world").unwrap();
        let options = StreamOptions {
            use_xsendfile: true,
            ..StreamOptions::default()
        };
        let mut t = target(&path);
        t.download = true;
        let response = stream_file(&HeaderMap::new(), &t, &options).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["x-sendfile"],
            path.display().to_string().as_str()
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"paper.pdf\""
        );
    }
}
