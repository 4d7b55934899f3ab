//! Time-limited upload link tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named credential that stands in for the API key until `expires_at`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadLink {
    /// Token name chosen by the link creator.
    pub name: String,

    /// The API key that authorized creation of this link.
    #[serde(skip_serializing)]
    pub api_key: String,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl UploadLink {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
