//! Axum handlers. Each one is a thin adapter over a repository call.

pub mod file_handlers;
pub mod health_handlers;
pub mod user_handlers;
