//! HTTP handlers for user profiles under `/api/v1/users`.

use crate::{
    errors::AppError,
    models::user::{CreateUserRequest, UpdateUserRequest, User, UserList},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

/// `POST /api/v1/users`: 201 with the new record.
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;
    req.validate()
        .map_err(|e| AppError::bad_request(e.to_string()))?;

    let user = state.users.create(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /api/v1/users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.users.get(&id).await?))
}

/// `HEAD /api/v1/users/{id}`: existence probe, no body.
pub async fn user_exists(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.users.exists(&id).await? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

/// `PUT /api/v1/users/{id}`: partial update; empty strings are ignored.
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;
    let req = req.normalized();
    req.validate()
        .map_err(|e| AppError::bad_request(e.to_string()))?;

    Ok(Json(state.users.update(&id, req).await?))
}

/// `DELETE /api/v1/users/{id}`: removes the profile and every file of the user.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.users.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/users`
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UserList>, AppError> {
    Ok(Json(state.users.list().await?.into()))
}
