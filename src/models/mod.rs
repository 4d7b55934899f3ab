//! Core data models for the content-delivery service.
//!
//! Both entities map to SQLite tables via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod object;
pub mod upload_link;
