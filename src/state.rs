//! Shared state handed to every handler.

use crate::{
    services::{file_service::FileService, user_service::UserService},
    store::ObjectStore,
};
use std::sync::Arc;

/// Built once at startup; cloning only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub users: UserService,
    pub files: FileService,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            users: UserService::new(store.clone()),
            files: FileService::new(store.clone()),
            store,
        }
    }
}
