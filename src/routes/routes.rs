//! Defines routes for the content-delivery service.
//!
//! ## Structure
//! - **Pages**
//!   - `GET  /`                   — landing page with upload form
//!   - `GET  /files`              — file listing (optionally key-protected)
//!   - `GET  /upload/{name}`      — upload form bound to an upload link
//!
//! - **Files**
//!   - `POST /upload`             — multipart upload
//!   - `GET  /files/{file_name}`  — serve a file, gzip-negotiated
//!   - `GET  /download/{name}`    — redirect to `/files/{name}`
//!
//! - **API**
//!   - `POST /api/uploadkey`      — mint a 12-hour upload link
//!
//! Anything else, including a known path with the wrong method, renders the
//! "Page Not Found" page.

use crate::{
    errors::{fallback, panic_response},
    handlers::{
        file_handlers::{download, serve_file},
        health_handlers::{healthz, readyz},
        page_handlers::{index, list_files, upload_link_form},
        upload_handlers::{create_upload_key, upload},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Build the router for all routes. Handlers receive `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // pages
        .route("/", get(index))
        .route("/files", get(list_files))
        .route("/upload/{name}", get(upload_link_form))
        // files
        .route("/upload", post(upload))
        .route("/files/{file_name}", get(serve_file))
        .route("/download/{name}", get(download))
        // api
        .route("/api/uploadkey", post(create_upload_key))
        .fallback(fallback)
        .method_not_allowed_fallback(fallback)
}

/// The complete application: routes, state, body limit, panic guard and
/// request tracing.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    routes()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
