//! src/services/storage_service.rs
//!
//! StorageService — the object store behind the CDN. Payload bytes live on
//! local disk at `base_path/{shard}/{shard}/{md5(key)}`, and one SQLite
//! row per object carries the content type, content encoding, size and MD5
//! tag. Writes are last-write-wins.

use crate::models::object::StoredObject;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// HTTP metadata recorded alongside an object's bytes.
#[derive(Clone, Debug, Default)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
}

/// StorageService provides the put/get/list surface the handlers need.
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Whether `name` is acceptable as an object key or upload link name.
///
/// Names are used as a single URL path segment, so separators, `.` and
/// traversal sequences are rejected.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name.len() <= MAX_OBJECT_KEY_LEN
        && !name.contains("..")
        && !name
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
}

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool and
    /// using `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if is_safe_name(key) {
            Ok(())
        } else {
            Err(StorageError::InvalidObjectKey)
        }
    }

    /// Construct the payload path for `key`: two shard directories from the
    /// first two bytes of MD5(key), then the full digest as the file name, so
    /// the on-disk name stays short whatever the key length.
    /// Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let digest = md5::compute(key);
        let mut path = self.base_path.clone();
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    async fn fetch_object(&self, key: &str) -> StorageResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT key, content_type, content_encoding, size_bytes, etag, last_modified
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound(key.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    /// Stream an object to disk and upsert its metadata.
    ///
    /// Bytes go to a temp file that is fsynced and renamed into place, so a
    /// reader never observes a partially written payload. The MD5 tag and
    /// size are computed while streaming.
    pub async fn put_object_stream<S>(
        &self,
        key: &str,
        metadata: ObjectMetadata,
        stream: S,
    ) -> StorageResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let etag = format!("{:x}", digest.compute());
        let last_modified = Utc::now();

        let object = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                key, content_type, content_encoding, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                content_encoding = excluded.content_encoding,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING key, content_type, content_encoding, size_bytes, etag, last_modified
            "#,
        )
        .bind(key)
        .bind(metadata.content_type)
        .bind(metadata.content_encoding)
        .bind(size_bytes)
        .bind(&etag)
        .bind(last_modified)
        .fetch_one(&*self.db)
        .await?;

        debug!(key, size_bytes, etag = %object.etag, "stored object");
        Ok(object)
    }

    /// Store an in-memory payload.
    pub async fn put_object(
        &self,
        key: &str,
        metadata: ObjectMetadata,
        bytes: Bytes,
    ) -> StorageResult<StoredObject> {
        let body = stream::once(async move { Ok::<_, io::Error>(bytes) });
        self.put_object_stream(key, metadata, body).await
    }

    /// Fetch an object for reading.
    ///
    /// Returns metadata and an opened File handle ready for streaming out.
    /// Returns ObjectNotFound if metadata exists but the payload is missing.
    pub async fn get_object_reader(&self, key: &str) -> StorageResult<(StoredObject, File)> {
        self.ensure_key_safe(key)?;
        let object = self.fetch_object(key).await?;

        let file = File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound(key.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// Fetch only object metadata.
    pub async fn get_object_metadata(&self, key: &str) -> StorageResult<StoredObject> {
        self.ensure_key_safe(key)?;
        self.fetch_object(key).await
    }

    /// Remove an object's row and payload. Deleting a missing object succeeds.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;

        let result = sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;

        match fs::remove_file(self.object_path(key)).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::Io(err)),
        }

        if result.rows_affected() > 0 {
            debug!(key, "deleted object");
        }
        Ok(())
    }

    /// List every stored object in key order.
    pub async fn list_objects(&self) -> StorageResult<Vec<StoredObject>> {
        let objects = sqlx::query_as::<_, StoredObject>(
            "SELECT key, content_type, content_encoding, size_bytes, etag, last_modified
             FROM objects ORDER BY key ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{memory_pool, read_object};
    use tempfile::TempDir;

    async fn service() -> (StorageService, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = memory_pool().await;
        (StorageService::new(pool, dir.path()), dir)
    }

    #[test]
    fn rejects_unsafe_names() {
        assert!(is_safe_name("notes.txt"));
        assert!(is_safe_name("写真.png"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name("."));
        assert!(is_safe_name(".env"));
        assert!(!is_safe_name("../etc/passwd"));
        assert!(!is_safe_name("nested/file.txt"));
        assert!(!is_safe_name("back\\slash"));
        assert!(!is_safe_name("tab\tname"));
        assert!(!is_safe_name(&"a".repeat(MAX_OBJECT_KEY_LEN + 1)));
    }

    #[tokio::test]
    async fn put_then_get_returns_bytes_and_metadata() {
        let (service, _dir) = service().await;
        let meta = ObjectMetadata {
            content_type: Some("text/plain".into()),
            content_encoding: None,
        };
        let stored = service
            .put_object("hello.txt", meta, Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(stored.size_bytes, 5);
        assert_eq!(stored.etag, format!("{:x}", md5::compute(b"hello")));
        assert_eq!(stored.content_type.as_deref(), Some("text/plain"));

        let (object, bytes) = read_object(&service, "hello.txt").await;
        assert_eq!(object.key, "hello.txt");
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn put_overwrites_existing_object() {
        let (service, _dir) = service().await;
        service
            .put_object("a.bin", ObjectMetadata::default(), Bytes::from_static(b"one"))
            .await
            .unwrap();
        let second = service
            .put_object("a.bin", ObjectMetadata::default(), Bytes::from_static(b"second"))
            .await
            .unwrap();

        assert_eq!(second.size_bytes, 6);
        let (_, bytes) = read_object(&service, "a.bin").await;
        assert_eq!(bytes, b"second");
        assert_eq!(service.list_objects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (service, _dir) = service().await;
        let err = service.get_object_metadata("nope.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound(key) if key == "nope.txt"));
    }

    #[tokio::test]
    async fn invalid_key_is_rejected_before_touching_disk() {
        let (service, dir) = service().await;
        let err = service
            .put_object("../escape", ObjectMetadata::default(), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidObjectKey));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn long_keys_are_stored_under_a_short_file_name() {
        let (service, _dir) = service().await;
        let key = format!("{}.txt.gz", "a".repeat(300));
        service
            .put_object(&key, ObjectMetadata::default(), Bytes::from_static(b"long"))
            .await
            .unwrap();

        let (object, bytes) = read_object(&service, &key).await;
        assert_eq!(object.key, key);
        assert_eq!(bytes, b"long");
        let path = service.object_path(&key);
        assert_eq!(path.file_name().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn delete_removes_row_and_payload() {
        let (service, _dir) = service().await;
        service
            .put_object("gone.txt", ObjectMetadata::default(), Bytes::from_static(b"x"))
            .await
            .unwrap();
        let path = service.object_path("gone.txt");
        assert!(path.exists());

        service.delete_object("gone.txt").await.unwrap();
        assert!(!path.exists());
        assert!(matches!(
            service.get_object_metadata("gone.txt").await,
            Err(StorageError::ObjectNotFound(_))
        ));

        // deleting again is not an error
        service.delete_object("gone.txt").await.unwrap();
    }

    #[tokio::test]
    async fn list_objects_is_ordered_by_key() {
        let (service, _dir) = service().await;
        for key in ["b.txt", "a.txt", "c.txt"] {
            service
                .put_object(key, ObjectMetadata::default(), Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        let keys: Vec<_> = service
            .list_objects()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["a.txt", "b.txt", "c.txt"]);
    }
}
