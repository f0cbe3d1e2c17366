//! Operator API.
//!
//! # Endpoints
//! - `GET /admin/breakers`: status of every circuit breaker
//! - `POST /admin/cache/invalidate` `{"key": "..."}`: drop one cache entry
//! - `POST /admin/cache/flush`: drop every entry in the shared store
//!
//! All endpoints require `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/breakers", get(list_breakers))
        .route("/admin/cache/invalidate", post(invalidate_cache))
        .route("/admin/cache/flush", post(flush_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
