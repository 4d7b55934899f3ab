//! Browsing pages: landing page, file listing and upload-link forms.

use crate::{errors::PageError, state::AppState, views::pages};
use axum::{
    extract::{Path, Query, State},
    response::Html,
};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub key: Option<String>,
}

/// `GET /`
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(pages::landing_page(&state.access))
}

/// `GET /files` — HTML table of every stored object.
///
/// With listing protection on, `?key=` must match the API key. Protection
/// without a configured key is reported as a server misconfiguration.
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Html<String>, PageError> {
    if state.access.restrict_listing {
        if state.access.api_key.is_none() {
            return Err(PageError::Misconfigured);
        }
        if !state.access.authorizes(query.key.as_deref()) {
            warn!("rejected file listing with missing or wrong API key");
            return Err(PageError::AuthRequired);
        }
    }

    let objects = state.storage.list_objects().await?;
    Ok(Html(pages::file_list_page(&objects)))
}

/// `GET /upload/{name}` — upload form bound to a live upload link.
pub async fn upload_link_form(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Html<String>, PageError> {
    match state.tokens.resolve(&name).await? {
        Some(link) => Ok(Html(pages::upload_link_page(&link.name))),
        None => Err(PageError::NotFound),
    }
}
