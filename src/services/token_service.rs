//! Upload link tokens: a small time-limited key-value store on SQLite.
//!
//! A token maps a caller-chosen name to the API key that created it. Lookups
//! only see rows whose `expires_at` lies in the future; an expired row found
//! during lookup is deleted on the spot.

use crate::{models::upload_link::UploadLink, services::storage_service::is_safe_name};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Lifetime of a freshly minted upload link.
pub const UPLOAD_LINK_TTL_HOURS: i64 = 12;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid upload link name")]
    InvalidName,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type TokenResult<T> = Result<T, TokenError>;

#[derive(Clone)]
pub struct TokenService {
    pub db: Arc<SqlitePool>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self {
            db,
            ttl: Duration::hours(UPLOAD_LINK_TTL_HOURS),
        }
    }

    /// Mint (or replace) the link `name`, valid for the configured TTL.
    pub async fn create(&self, name: &str, api_key: &str) -> TokenResult<UploadLink> {
        self.create_at(name, api_key, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        name: &str,
        api_key: &str,
        now: DateTime<Utc>,
    ) -> TokenResult<UploadLink> {
        if !is_safe_name(name) {
            return Err(TokenError::InvalidName);
        }

        let link = UploadLink {
            name: name.to_string(),
            api_key: api_key.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.write(&link).await?;
        debug!(name, expires_at = %link.expires_at, "created upload link");
        Ok(link)
    }

    /// Look up a live link by name.
    pub async fn resolve(&self, name: &str) -> TokenResult<Option<UploadLink>> {
        self.resolve_at(name, Utc::now()).await
    }

    pub async fn resolve_at(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> TokenResult<Option<UploadLink>> {
        if !is_safe_name(name) {
            return Ok(None);
        }

        let link = sqlx::query_as::<_, UploadLink>(
            "SELECT name, api_key, created_at, expires_at FROM upload_links WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;

        match link {
            Some(link) if link.is_valid_at(now) => Ok(Some(link)),
            Some(link) => {
                sqlx::query("DELETE FROM upload_links WHERE name = ?")
                    .bind(&link.name)
                    .execute(&*self.db)
                    .await?;
                debug!(name, "purged expired upload link");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Record a use of `link`. The row is re-written with its original value
    /// and expiry; links stay usable for their whole window.
    pub async fn touch(&self, link: &UploadLink) -> TokenResult<()> {
        self.write(link).await
    }

    async fn write(&self, link: &UploadLink) -> TokenResult<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_links (name, api_key, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                api_key = excluded.api_key,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&link.name)
        .bind(&link.api_key)
        .bind(link.created_at)
        .bind(link.expires_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }
}
