//! Static extension → MIME type table used when serving files.

use crate::services::compression::file_extension;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const MIME_TYPES: [(&str, &str); 18] = [
    ("mp4", "video/mp4"),
    ("pdf", "application/pdf"),
    ("webm", "video/webm"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("js", "application/javascript"),
    ("css", "text/css"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
];

/// MIME type for `file_name` based on its extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_extension(file_name);
    MIME_TYPES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
