use crate::{
    services::{storage_service::StorageError, token_service::TokenError},
    views::pages,
};
use axum::{
    Json,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde_json::json;
use std::{any::Any, fmt};

/// Error for the JSON endpoints (`/upload`, `/api/*`). Renders as `{"error": ...}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "request failed: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidObjectKey => AppError::bad_request("Invalid file name"),
            StorageError::ObjectNotFound(_) => AppError::new(StatusCode::NOT_FOUND, err.to_string()),
            other => AppError::internal(other.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidName => AppError::bad_request("Invalid upload link name"),
            other => AppError::internal(other.to_string()),
        }
    }
}

/// Error for the browsing endpoints. Renders one of the HTML error pages.
#[derive(Debug)]
pub enum PageError {
    NotFound,
    FileNotFound(String),
    AuthRequired,
    /// Listing protection is on but no API key is configured.
    Misconfigured,
    Internal(String),
}

impl PageError {
    pub fn status(&self) -> StatusCode {
        match self {
            PageError::NotFound | PageError::FileNotFound(_) => StatusCode::NOT_FOUND,
            PageError::AuthRequired => StatusCode::UNAUTHORIZED,
            PageError::Misconfigured | PageError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::NotFound => write!(f, "page not found"),
            PageError::FileNotFound(name) => write!(f, "file `{}` not found", name),
            PageError::AuthRequired => write!(f, "authentication required"),
            PageError::Misconfigured => {
                write!(f, "listing protection enabled without an API key")
            }
            PageError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PageError {}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let page = match &self {
            PageError::NotFound => pages::not_found_page(),
            PageError::FileNotFound(name) => pages::file_not_found_page(name),
            PageError::AuthRequired => pages::auth_required_page(),
            PageError::Misconfigured => {
                tracing::error!("{}", self);
                pages::misconfigured_page()
            }
            PageError::Internal(msg) => {
                tracing::error!("Application error: {}", msg);
                pages::internal_error_page()
            }
        };
        (self.status(), Html(page)).into_response()
    }
}

impl From<StorageError> for PageError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectNotFound(name) => PageError::FileNotFound(name),
            StorageError::InvalidObjectKey => PageError::NotFound,
            other => PageError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for PageError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidName => PageError::NotFound,
            other => PageError::Internal(other.to_string()),
        }
    }
}

/// Turns a handler panic into the generic internal error page.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    PageError::Internal(format!("handler panicked: {}", detail)).into_response()
}

/// Router fallback for unknown paths.
pub async fn fallback() -> PageError {
    PageError::NotFound
}
