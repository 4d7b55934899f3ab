//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and disk I/O

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness probe. Never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Runs a lightweight query against SQLite (`SELECT 1`).
/// 2. Performs a write/read/delete round trip under the payload directory.
///
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite_check = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.storage.db)
        .await
    {
        Ok(1) => (true, None::<String>),
        Ok(v) => (false, Some(format!("unexpected result: {}", v))),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    let tmp_path = state
        .storage
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let disk_check = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => match fs::read(&tmp_path).await {
            Ok(bytes) if bytes == b"readyz" => match fs::remove_file(&tmp_path).await {
                Ok(_) => (true, None::<String>),
                Err(e) => (true, Some(format!("could not remove tmp file: {}", e))),
            },
            Ok(_) => {
                let _ = fs::remove_file(&tmp_path).await;
                (false, Some("file content mismatch".to_string()))
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                (false, Some(format!("could not read tmp file: {}", e)))
            }
        },
        Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
    };

    let overall_ok = sqlite_check.0 && disk_check.0;
    if !overall_ok {
        tracing::warn!(?sqlite_check, ?disk_check, "readiness check failed");
    }

    let mut checks = HashMap::new();
    checks.insert(
        "sqlite",
        CheckStatus {
            ok: sqlite_check.0,
            error: sqlite_check.1,
        },
    );
    checks.insert(
        "disk",
        CheckStatus {
            ok: disk_check.0,
            error: disk_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use crate::{config::AccessConfig, test_utils::test_server};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn healthz_is_ok() {
        let (server, _state, _dir) = test_server(AccessConfig::default()).await;
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        assert_eq!(response.json::<serde_json::Value>()["status"], "ok");
    }

    #[tokio::test]
    async fn readyz_checks_sqlite_and_disk() {
        let (server, _state, _dir) = test_server(AccessConfig::default()).await;
        let response = server.get("/readyz").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["checks"]["sqlite"]["ok"], true);
        assert_eq!(body["checks"]["disk"]["ok"], true);
    }

    #[tokio::test]
    async fn readyz_reports_missing_payload_dir() {
        let (server, _state, dir) = test_server(AccessConfig::default()).await;
        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(!path.exists());

        let response = server.get("/readyz").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }
}
