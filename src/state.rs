use crate::{
    config::AccessConfig,
    services::{storage_service::StorageService, token_service::TokenService},
};
use std::sync::Arc;

/// Shared state carried by the router into every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub tokens: TokenService,
    pub access: Arc<AccessConfig>,
}

impl AppState {
    pub fn new(storage: StorageService, tokens: TokenService, access: AccessConfig) -> Self {
        Self {
            storage,
            tokens,
            access: Arc::new(access),
        }
    }
}
