//! HTTP front end serving stored files.
//!
//! One route, `GET /record/:recid/files/:name`, resolves a file of a record
//! and hands it to the streaming layer. The storage core is synchronous, so
//! handlers run it on the blocking pool.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::access::{Authorizer, DenyRestricted, UserInfo};
use crate::config::Settings;
use crate::repository::DocStore;
use crate::stream::StreamOptions;

/// Shared state for the file server.
#[derive(Clone)]
pub struct AppState {
    pub store: DocStore,
    pub authorizer: Arc<dyn Authorizer>,
    /// Identity used for every request; the server has no login.
    pub user: UserInfo,
    pub stream_options: StreamOptions,
    pub md5_check_probability: f64,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            store: DocStore::from_settings(settings)?,
            authorizer: Arc::new(DenyRestricted),
            user: UserInfo::guest(),
            stream_options: StreamOptions {
                use_xsendfile: settings.use_xsendfile,
                enable_range_requests: settings.enable_http_range_requests,
            },
            md5_check_probability: settings.md5_check_probability,
        })
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }
}

/// Start the file server.
pub async fn serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let app = create_router(state);

    let addr: SocketAddr = bind.parse()?;
    tracing::info!("Serving files at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::access::AllowAll;
    use crate::bibdoc::FileOptions;
    use crate::bibrecdocs::BibRecDocs;

    fn setup_test_state(dir: &std::path::Path) -> AppState {
        let store = DocStore::new(&dir.join("test.db"), &dir.join("files")).unwrap();
        let source = dir.join("paper.pdf");
        std::fs::write(&source, b"%PDF-1.4 first version").unwrap();

        let mut recdocs = BibRecDocs::new(&store, 42, false).unwrap();
        recdocs
            .add_new_file(&source, "Main", None, false, &FileOptions::default())
            .unwrap();
        std::fs::write(&source, b"%PDF-1.4 second version").unwrap();
        recdocs
            .add_new_version(&source, Some("paper"), &FileOptions::default())
            .unwrap();

        AppState {
            store,
            authorizer: Arc::new(DenyRestricted),
            user: UserInfo::guest(),
            stream_options: StreamOptions::default(),
            md5_check_probability: 1.0,
        }
    }

    async fn get(app: axum::Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_latest_version() {
        let dir = tempdir().unwrap();
        let app = create_router(setup_test_state(dir.path()));

        let response = get(app, "/record/42/files/paper.pdf").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"%PDF-1.4 second version");
    }

    #[tokio::test]
    async fn test_serves_requested_version_as_attachment() {
        let dir = tempdir().unwrap();
        let app = create_router(setup_test_state(dir.path()));

        let response = get(app, "/record/42/files/paper.pdf?version=1&download=1").await;

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment"));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"%PDF-1.4 first version");
    }

    #[tokio::test]
    async fn test_unknown_file_is_404() {
        let dir = tempdir().unwrap();
        let app = create_router(setup_test_state(dir.path()));

        assert_eq!(get(app.clone(), "/record/42/files/missing.pdf").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(app.clone(), "/record/7/files/paper.pdf").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(app, "/record/42/files/paper.pdf?version=9").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_restricted_file_is_401() {
        let dir = tempdir().unwrap();
        let state = setup_test_state(dir.path());
        let recdocs = BibRecDocs::new(&state.store, 42, false).unwrap();
        recdocs.get_bibdoc("paper").unwrap().set_status("restricted").unwrap();

        let response = get(create_router(state.clone()), "/record/42/files/paper.pdf").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let open = state.with_authorizer(Arc::new(AllowAll));
        let response = get(create_router(open), "/record/42/files/paper.pdf").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_range_request() {
        let dir = tempdir().unwrap();
        let app = create_router(setup_test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/record/42/files/paper.pdf")
                    .header(header::RANGE, "bytes=0-3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"%PDF");
    }
}
