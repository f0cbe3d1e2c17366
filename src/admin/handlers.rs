use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::http::server::AppState;
use crate::resilience::BreakerStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateRequest {
    pub key: String,
}

type AdminResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn unavailable(e: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": e.to_string() })),
    )
}

pub async fn list_breakers(State(state): State<AppState>) -> Json<Vec<BreakerStatus>> {
    Json(state.services.breakers.snapshot())
}

pub async fn invalidate_cache(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> AdminResult {
    if request.key.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "key must not be empty" })),
        ));
    }
    state
        .services
        .cache
        .invalidate(&request.key)
        .await
        .map_err(unavailable)?;
    Ok(Json(json!({ "invalidated": request.key })))
}

pub async fn flush_cache(State(state): State<AppState>) -> AdminResult {
    state.services.cache.flush_all().await.map_err(unavailable)?;
    Ok(Json(json!({ "flushed": true })))
}
