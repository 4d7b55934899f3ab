//! Represents a stored file (or its gzip variant) in the object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Suffix appended to the key of the gzip-encoded variant of a file.
pub const GZIP_SUFFIX: &str = ".gz";

/// Metadata for a single stored object.
///
/// The payload bytes live on disk; this struct mirrors the SQLite row.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Object key. Either the logical file name or `<name>.gz`.
    pub key: String,

    /// Content type (MIME type) declared at upload time.
    pub content_type: Option<String>,

    /// Content encoding of the stored bytes (`gzip` for compressed variants).
    pub content_encoding: Option<String>,

    /// Size of the stored bytes.
    pub size_bytes: i64,

    /// MD5 hex digest of the stored bytes.
    pub etag: String,

    /// Timestamp of the last write.
    pub last_modified: DateTime<Utc>,
}

impl StoredObject {
    pub fn is_gzip(&self) -> bool {
        self.content_encoding
            .as_deref()
            .is_some_and(|enc| enc.eq_ignore_ascii_case("gzip"))
    }

    /// Name the file is served under, with the `.gz` suffix stripped from
    /// compressed variants.
    pub fn logical_name(&self) -> &str {
        if self.is_gzip() {
            self.key.strip_suffix(GZIP_SUFFIX).unwrap_or(&self.key)
        } else {
            &self.key
        }
    }
}

/// Key of the gzip variant for a logical file name.
pub fn gzip_key(name: &str) -> String {
    format!("{}{}", name, GZIP_SUFFIX)
}
