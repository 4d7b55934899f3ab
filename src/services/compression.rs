//! Decides which uploads are stored gzip-encoded and performs the encoding.

use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use std::io::{self, Write};
use thiserror::Error;

/// Content type prefixes treated as text-like.
const COMPRESSIBLE_TYPES: [&str; 5] = [
    "text/",
    "application/javascript",
    "application/json",
    "application/xml",
    "image/svg+xml",
];

/// File extensions treated as text-like regardless of declared type.
const COMPRESSIBLE_EXTENSIONS: [&str; 8] = ["js", "css", "html", "json", "xml", "svg", "txt", "md"];

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("gzip encoding failed: {0}")]
    Encode(#[from] io::Error),
    #[error("compression task did not complete: {0}")]
    Task(String),
}

/// Lowercased text after the last `.` in `file_name`, or an empty string.
pub fn file_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Whether a file with this declared type and name should be stored gzipped.
pub fn should_compress(content_type: &str, file_name: &str) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    if COMPRESSIBLE_TYPES
        .iter()
        .any(|prefix| content_type.starts_with(prefix))
    {
        return true;
    }

    let ext = file_extension(file_name);
    COMPRESSIBLE_EXTENSIONS.contains(&ext.as_str())
}

/// Gzip-encode `data` at the default level.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Gzip-encode `data` on the blocking thread pool.
pub async fn gzip_async(data: Bytes) -> Result<Bytes, CompressionError> {
    tokio::task::spawn_blocking(move || gzip(&data))
        .await
        .map_err(|err| CompressionError::Task(err.to_string()))?
        .map(Bytes::from)
}
