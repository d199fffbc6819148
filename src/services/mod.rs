//! Repositories layered on the object store.

pub mod error;
pub mod file_service;
pub mod user_service;
