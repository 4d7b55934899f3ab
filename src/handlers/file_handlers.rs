//! File delivery: `GET /files/{file_name}` and `GET /download/{name}`.
//!
//! Bodies are streamed from disk. Responses are cacheable forever and vary
//! on `Accept-Encoding`, since the same URL serves either the gzip variant or
//! the original.

use crate::{
    errors::PageError,
    models::object::{StoredObject, gzip_key},
    services::{
        content_type::content_type_for,
        storage_service::{StorageError, is_safe_name},
    },
    state::AppState,
    views::pages::encode_path_segment,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use tokio_util::io::ReaderStream;
use tracing::debug;

pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Which stored variant answers a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    Gzip,
    Original,
}

impl Variant {
    fn cache_tag(self) -> &'static str {
        match self {
            Variant::Gzip => "gzip",
            Variant::Original => "original",
        }
    }
}

/// Whether an `Accept-Encoding` value admits gzip (`gzip` or `x-gzip` with a
/// non-zero q-value).
pub fn accepts_gzip(value: Option<&HeaderValue>) -> bool {
    let Some(value) = value.and_then(|v| v.to_str().ok()) else {
        return false;
    };

    value.split(',').any(|item| {
        let mut params = item.split(';');
        let coding = params.next().unwrap_or_default().trim();
        if !(coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("x-gzip")) {
            return false;
        }
        let q = params
            .filter_map(|param| {
                let (name, value) = param.split_once('=')?;
                if name.trim().eq_ignore_ascii_case("q") {
                    value.trim().parse::<f32>().ok()
                } else {
                    None
                }
            })
            .next()
            .unwrap_or(1.0);
        q > 0.0
    })
}

fn is_visible_ascii(value: &str) -> bool {
    value.bytes().all(|b| (0x21..=0x7e).contains(&b) && b != b'"')
}

/// Quoted ETag combining the cache key (`<name>-<variant>`) with the stored
/// object's MD5 tag. Anything that is not plain visible ASCII is
/// base64-encoded so the value is always a legal header.
pub fn composite_etag(file_name: &str, variant: Variant, native_tag: &str) -> String {
    let composite = format!("{}-{}-{}", file_name, variant.cache_tag(), native_tag);
    if is_visible_ascii(&composite) {
        format!("\"{}\"", composite)
    } else {
        format!("\"{}\"", general_purpose::STANDARD.encode(composite))
    }
}

fn if_none_match_hits(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|candidate| candidate.trim().trim_start_matches("W/"))
        .any(|candidate| candidate == "*" || candidate == etag)
}

fn set_file_headers(
    headers: &mut HeaderMap,
    file_name: &str,
    meta: &StoredObject,
    variant: Variant,
    etag: &str,
) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(file_name)),
    );
    if variant == Variant::Gzip {
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(
        &meta
            .last_modified
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string(),
    ) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

/// Pick the variant to serve: the gzip object when the client accepts gzip
/// and one exists, otherwise the original.
async fn select_variant(
    state: &AppState,
    file_name: &str,
    wants_gzip: bool,
) -> Result<(StoredObject, Variant), PageError> {
    if wants_gzip {
        match state.storage.get_object_metadata(&gzip_key(file_name)).await {
            Ok(meta) if meta.is_gzip() => return Ok((meta, Variant::Gzip)),
            Ok(_) | Err(StorageError::ObjectNotFound(_)) | Err(StorageError::InvalidObjectKey) => {}
            Err(err) => return Err(err.into()),
        }
    }

    match state.storage.get_object_metadata(file_name).await {
        Ok(meta) => Ok((meta, Variant::Original)),
        Err(StorageError::ObjectNotFound(_)) => Err(PageError::FileNotFound(file_name.to_string())),
        Err(err) => Err(err.into()),
    }
}

/// `GET /files/{file_name}` — serve a stored file.
///
/// `Range` is not honored; the full body is always returned with 200.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, PageError> {
    if !is_safe_name(&file_name) {
        return Err(PageError::FileNotFound(file_name));
    }
    if headers.contains_key(header::RANGE) {
        debug!(file = %file_name, "ignoring Range header, serving full content");
    }

    let wants_gzip = accepts_gzip(headers.get(header::ACCEPT_ENCODING));
    let (meta, variant) = select_variant(&state, &file_name, wants_gzip).await?;
    let etag = composite_etag(&file_name, variant, &meta.etag);

    if if_none_match_hits(&headers, &etag) {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        set_file_headers(response.headers_mut(), &file_name, &meta, variant, &etag);
        return Ok(response);
    }

    let (meta, file) = state
        .storage
        .get_object_reader(&meta.key)
        .await
        .map_err(|err| match err {
            StorageError::ObjectNotFound(_) => PageError::FileNotFound(file_name.clone()),
            other => other.into(),
        })?;
    let etag = composite_etag(&file_name, variant, &meta.etag);

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    set_file_headers(headers, &file_name, &meta, variant, &etag);
    if let Ok(value) = HeaderValue::from_str(&meta.size_bytes.max(0).to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }

    debug!(file = %file_name, key = %meta.key, ?variant, "serving file");
    Ok(response)
}

/// `GET /download/{name}` — redirect to the canonical file URL.
pub async fn download(Path(name): Path<String>) -> Response {
    let location = format!("/files/{}", encode_path_segment(&name));
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL.to_string()),
        ],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AccessConfig, services::storage_service::ObjectMetadata, test_utils::test_server,
    };
    use axum_test::multipart::{MultipartForm, Part};
    use bytes::Bytes;

    const NOTES: &[u8] = b"notes notes notes notes notes notes notes notes";

    fn gzip_header() -> (header::HeaderName, HeaderValue) {
        (header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"))
    }

    async fn upload(server: &axum_test::TestServer, name: &str, mime: &str, body: &[u8]) {
        server
            .post("/upload")
            .multipart(MultipartForm::new().add_part(
                "file",
                Part::bytes(body.to_vec()).file_name(name).mime_type(mime),
            ))
            .await
            .assert_status_ok();
    }

    #[test]
    fn accept_encoding_parsing() {
        let hv = |s: &'static str| HeaderValue::from_static(s);
        assert!(accepts_gzip(Some(&hv("gzip"))));
        assert!(accepts_gzip(Some(&hv("br;q=1.0, GZIP;q=0.5"))));
        assert!(accepts_gzip(Some(&hv("x-gzip"))));
        assert!(!accepts_gzip(Some(&hv("gzip;q=0"))));
        assert!(!accepts_gzip(Some(&hv("br, deflate"))));
        assert!(!accepts_gzip(Some(&hv("identity"))));
        assert!(!accepts_gzip(None));
    }

    #[test]
    fn ascii_etag_is_kept_verbatim() {
        assert_eq!(
            composite_etag("notes.txt", Variant::Gzip, "abc123"),
            "\"notes.txt-gzip-abc123\""
        );
    }

    #[test]
    fn non_ascii_etag_is_base64_encoded() {
        let etag = composite_etag("写真.png", Variant::Original, "abc123");
        assert!(etag.is_ascii());
        let inner = etag.trim_matches('"');
        let decoded = general_purpose::STANDARD.decode(inner).unwrap();
        assert_eq!(decoded, "写真.png-original-abc123".as_bytes());
    }

    #[tokio::test]
    async fn gzip_client_gets_gzip_variant() {
        let (server, _state, _dir) = test_server(AccessConfig::default()).await;
        upload(&server, "notes.txt", "text/plain", NOTES).await;

        let (name, value) = gzip_header();
        let response = server.get("/files/notes.txt").add_header(name, value).await;

        response.assert_status_ok();
        assert_eq!(response.header(header::CONTENT_ENCODING), "gzip");
        assert_eq!(response.header(header::CONTENT_TYPE), "text/plain");
        assert_eq!(response.header(header::CACHE_CONTROL), IMMUTABLE_CACHE_CONTROL);
        assert_eq!(response.header(header::VARY), "Accept-Encoding");
        let etag = response.header(header::ETAG);
        assert!(etag.to_str().unwrap().starts_with("\"notes.txt-gzip-"));
        assert_ne!(response.as_bytes().as_ref(), NOTES);
    }

    #[tokio::test]
    async fn plain_client_gets_original_bytes() {
        let (server, _state, _dir) = test_server(AccessConfig::default()).await;
        upload(&server, "notes.txt", "text/plain", NOTES).await;

        let response = server.get("/files/notes.txt").await;

        response.assert_status_ok();
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(response.as_bytes().as_ref(), NOTES);
        let etag = response.header(header::ETAG);
        assert!(etag.to_str().unwrap().starts_with("\"notes.txt-original-"));
    }

    #[tokio::test]
    async fn gzip_client_falls_back_to_original_without_variant() {
        let (server, _state, _dir) = test_server(AccessConfig::default()).await;
        upload(&server, "clip.mp4", "video/mp4", b"\x00\x00\x00\x18ftyp").await;

        let (name, value) = gzip_header();
        let response = server.get("/files/clip.mp4").add_header(name, value).await;

        response.assert_status_ok();
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(response.header(header::CONTENT_TYPE), "video/mp4");
    }

    #[tokio::test]
    async fn range_header_still_returns_full_body() {
        let (server, _state, _dir) = test_server(AccessConfig::default()).await;
        upload(&server, "clip.mp4", "video/mp4", b"0123456789").await;

        let response = server
            .get("/files/clip.mp4")
            .add_header(header::RANGE, HeaderValue::from_static("bytes=0-3"))
            .await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.as_bytes().as_ref(), b"0123456789");
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
    }

    #[tokio::test]
    async fn missing_file_renders_not_found_page() {
        let (server, _state, _dir) = test_server(AccessConfig::default()).await;

        let response = server.get("/files/ghost.txt").await;

        response.assert_status(StatusCode::NOT_FOUND);
        assert!(response.text().contains("File Not Found"));
        assert!(response.text().contains("ghost.txt"));
    }

    #[tokio::test]
    async fn non_ascii_names_get_base64_etag() {
        let (server, state, _dir) = test_server(AccessConfig::default()).await;
        state
            .storage
            .put_object(
                "写真.png",
                ObjectMetadata {
                    content_type: Some("image/png".into()),
                    content_encoding: None,
                },
                Bytes::from_static(b"\x89PNG"),
            )
            .await
            .unwrap();

        let response = server.get("/files/%E5%86%99%E7%9C%9F.png").await;

        response.assert_status_ok();
        let etag = response.header(header::ETAG);
        let etag = etag.to_str().unwrap();
        let decoded = general_purpose::STANDARD
            .decode(etag.trim_matches('"'))
            .unwrap();
        assert!(String::from_utf8(decoded).unwrap().starts_with("写真.png-original-"));
    }

    #[tokio::test]
    async fn matching_if_none_match_returns_not_modified() {
        let (server, _state, _dir) = test_server(AccessConfig::default()).await;
        upload(&server, "notes.txt", "text/plain", NOTES).await;

        let first = server.get("/files/notes.txt").await;
        let etag = first.header(header::ETAG);

        let second = server
            .get("/files/notes.txt")
            .add_header(header::IF_NONE_MATCH, etag.clone())
            .await;
        second.assert_status(StatusCode::NOT_MODIFIED);
        assert_eq!(second.header(header::ETAG), etag);
        assert!(second.as_bytes().is_empty());
    }

    #[tokio::test]
    async fn download_redirects_with_cache_headers() {
        let (server, _state, _dir) = test_server(AccessConfig::default()).await;

        let response = server.get("/download/my%20file.txt").await;

        response.assert_status(StatusCode::FOUND);
        assert_eq!(response.header(header::LOCATION), "/files/my%20file.txt");
        assert_eq!(response.header(header::CACHE_CONTROL), IMMUTABLE_CACHE_CONTROL);
    }
}
