//! Health & readiness handlers.
//!
//! - GET /        -> static banner
//! - GET /health  -> simple liveness ("ok")
//! - GET /readyz  -> readiness that probes the object store

use crate::{keys, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /`
pub async fn root() -> impl IntoResponse {
    Json(HealthResponse {
        status: "I'm running!".into(),
    })
}

/// `GET /health`
///
/// Liveness probe. Always 200 and never touches the store.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe: runs an existence check against the store. A missing key is
/// a successful answer; only a failing call marks the service unready.
/// Returns 200 when the store answers, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let probe_key = format!("{}.readyz", keys::USERS_PREFIX);
    let store_check = match state.store.exists(&probe_key).await {
        Ok(_) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(e) => CheckStatus {
            ok: false,
            error: Some(format!("error: {}", e)),
        },
    };

    let overall_ok = store_check.ok;
    let mut checks = HashMap::new();
    checks.insert(state.store.backend(), store_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
