//! Defines routes for the user and file API.
//!
//! ## Structure
//! - **Probes**
//!   - `GET    /`, `GET /health`: static liveness
//!   - `GET    /readyz`: store round-trip
//!
//! - **Users**
//!   - `GET    /api/v1/users`: list users
//!   - `POST   /api/v1/users`: create user
//!   - `GET    /api/v1/users/{id}`: fetch user
//!   - `HEAD   /api/v1/users/{id}`: existence check
//!   - `PUT    /api/v1/users/{id}`: partial update
//!   - `DELETE /api/v1/users/{id}`: delete user and all their files
//!
//! - **Files**
//!   - `POST   /api/v1/files/upload/{user_id}`: multipart upload
//!   - `GET    /api/v1/files/{user_id}`: list files
//!   - `GET    /api/v1/files/{user_id}/{filename}`: download
//!   - `DELETE /api/v1/files/{user_id}/{filename}`: delete
//!   - `GET    /api/v1/files/{user_id}/{filename}/download-url`: signed GET URL
//!   - `GET    /api/v1/files/{user_id}/{filename}/upload-url`: signed PUT URL

use crate::{
    handlers::{
        file_handlers::{
            delete_file, download_url, get_file, list_files, upload_file, upload_url,
        },
        health_handlers::{health, readyz, root},
        user_handlers::{
            create_user, delete_user, get_user, list_users, update_user, user_exists,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router for every endpoint.
///
/// The router carries shared state (`AppState`) to all handlers.
/// `max_upload_bytes` bounds request bodies, multipart uploads included.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/", get(root))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        // User routes
        .route("/api/v1/users", get(list_users).post(create_user))
        .route(
            "/api/v1/users/{id}",
            get(get_user)
                .head(user_exists)
                .put(update_user)
                .delete(delete_user),
        )
        // File routes
        .route("/api/v1/files/upload/{user_id}", post(upload_file))
        .route("/api/v1/files/{user_id}", get(list_files))
        .route(
            "/api/v1/files/{user_id}/{filename}",
            get(get_file).delete(delete_file),
        )
        .route(
            "/api/v1/files/{user_id}/{filename}/download-url",
            get(download_url),
        )
        .route(
            "/api/v1/files/{user_id}/{filename}/upload-url",
            get(upload_url),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
