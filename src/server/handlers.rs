//! Request handlers.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, info};

use super::AppState;
use crate::bibrecdocs::BibRecDocs;
use crate::error::{BibDocFileError, Result};

/// Query parameters selecting which file to deliver.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileParams {
    pub version: Option<i64>,
    pub subformat: Option<String>,
    pub download: Option<String>,
}

impl FileParams {
    fn wants_download(&self) -> bool {
        matches!(self.download.as_deref(), Some("1" | "true" | "yes"))
    }
}

/// Serve `<name>` (docname plus extension) of record `recid`.
pub async fn serve_record_file(
    State(state): State<AppState>,
    Path((recid, name)): Path<(i64, String)>,
    Query(params): Query<FileParams>,
    headers: HeaderMap,
) -> Response {
    let handle = tokio::task::spawn_blocking(move || stream_record_file(&state, recid, &name, &params, &headers));

    match handle.await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => error_response(e),
        Err(e) => {
            error!("File request task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

fn stream_record_file(
    state: &AppState,
    recid: i64,
    name: &str,
    params: &FileParams,
    headers: &HeaderMap,
) -> Result<Response> {
    let recdocs = BibRecDocs::new(&state.store, recid, false)?;
    let subformat = params.subformat.as_deref().unwrap_or("");
    let file = recdocs
        .bibdocs()
        .iter()
        .flat_map(|doc| {
            let version = params.version.unwrap_or_else(|| doc.get_latest_version());
            doc.list_version_files(version, false)
        })
        .find(|f| f.get_full_name() == name && f.get_subformat() == subformat)
        .ok_or_else(|| BibDocFileError::NotFound(format!("{} of record {}", name, recid)))?;

    let (code, message) = file.is_restricted(state.authorizer.as_ref(), &state.user);
    if code != 0 {
        info!("Refused {} of record {}: {}", name, recid, message);
        return Ok((StatusCode::UNAUTHORIZED, message).into_response());
    }

    file.stream(
        headers,
        params.wants_download(),
        state.md5_check_probability,
        &state.stream_options,
    )
}

fn error_response(e: BibDocFileError) -> Response {
    match e {
        BibDocFileError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)).into_response(),
        BibDocFileError::InvalidName(name) => (StatusCode::BAD_REQUEST, format!("Invalid name: {}", name)).into_response(),
        e => {
            error!("Cannot serve file: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
