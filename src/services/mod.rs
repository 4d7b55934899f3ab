pub mod compression;
pub mod content_type;
pub mod storage_service;
pub mod token_service;
