//! Shared fixtures for handler and service tests.

use crate::{
    config::AccessConfig,
    db::run_migrations,
    models::object::StoredObject,
    routes::routes::app,
    services::{storage_service::StorageService, token_service::TokenService},
    state::AppState,
};
use axum_test::TestServer;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

const TEST_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// A migrated in-memory database. One connection that never expires, so
/// every query sees the same database.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    run_migrations(&pool).await.expect("apply schema");
    Arc::new(pool)
}

/// Read an object's metadata and full payload.
pub async fn read_object(storage: &StorageService, key: &str) -> (StoredObject, Vec<u8>) {
    let (object, mut file) = storage
        .get_object_reader(key)
        .await
        .unwrap_or_else(|err| panic!("object {key} should exist: {err}"));
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await.expect("read payload");
    (object, bytes)
}

/// Full application behind an in-process test server. Keep the `TempDir`
/// alive for the duration of the test.
pub async fn test_server(access: AccessConfig) -> (TestServer, AppState, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let pool = memory_pool().await;
    let state = AppState::new(
        StorageService::new(pool.clone(), dir.path()),
        TokenService::new(pool),
        access,
    );
    let server = TestServer::new(app(state.clone(), TEST_BODY_LIMIT)).expect("start test server");
    (server, state, dir)
}
