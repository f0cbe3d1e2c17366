//! Idempotent replay of mutating requests.
//!
//! # Flow
//! ```text
//! POST/PUT/PATCH with Idempotency-Key
//!     → store lookup
//!         hit  → replay stored status/body/headers + x-idempotency-replayed
//!         miss → run handler → status in [200, 400) → persist record (24h TTL)
//!         store down → run handler, no record, no replay
//! ```
//!
//! # Guarantees and Limits
//! - Replays a previously observed response; it does not make the handler
//!   itself run exactly once
//! - No per-key locking: two concurrent requests with the same unused key can
//!   both miss and both reach the handler
//! - The record key is the client's key verbatim, shared across routes and
//!   callers. Reusing a key on another endpoint replays the first endpoint's
//!   response. Domain-level uniqueness constraints remain the source of truth.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::IdempotencyConfig;
use crate::http::middleware::timing::record_stage;
use crate::http::request::RequestIdExt;
use crate::http::response::{BufferedResponse, Captured};
use crate::observability::metrics;
use crate::store::{KeyedStore, StoreResult};

/// Marker header on replayed responses.
pub const IDEMPOTENCY_REPLAYED: HeaderName = HeaderName::from_static("x-idempotency-replayed");

const DEFAULT_KEY_HEADER: HeaderName = HeaderName::from_static("idempotency-key");

/// Response headers worth replaying. Everything else is regenerated per response.
const REPLAYED_HEADERS: [HeaderName; 6] = [
    header::CONTENT_TYPE,
    header::CONTENT_LANGUAGE,
    header::LOCATION,
    header::ETAG,
    header::LAST_MODIFIED,
    header::CACHE_CONTROL,
];

/// A stored terminal response. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub status_code: u16,
    pub body: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
}

impl IdempotencyRecord {
    fn from_response(key: &str, response: &BufferedResponse) -> Self {
        Self {
            key: key.to_string(),
            status_code: response.status.as_u16(),
            body: response.body.to_vec(),
            headers: selected_headers(&response.headers),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Rebuild the stored response, marked as a replay.
    pub fn into_replay(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        let mut response = (status, self.body).into_response();

        let headers = response.headers_mut();
        headers.remove(header::CONTENT_TYPE);
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        headers.insert(IDEMPOTENCY_REPLAYED, HeaderValue::from_static("true"));
        response
    }
}

fn selected_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    REPLAYED_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(name)?.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Outcome of a record lookup.
#[derive(Debug)]
pub enum Lookup {
    Hit(IdempotencyRecord),
    Miss,
    /// The store could not be consulted; proceed without replay or recording.
    Unavailable,
}

/// Only create/update/replace requests are guarded.
pub fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Idempotency guard service, shared by reference across requests.
pub struct IdempotencyGuard {
    store: Arc<dyn KeyedStore>,
    config: IdempotencyConfig,
    key_header: HeaderName,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn KeyedStore>, config: IdempotencyConfig) -> Self {
        let key_header = HeaderName::try_from(config.header_name.as_str()).unwrap_or_else(|_| {
            tracing::warn!(header = %config.header_name, "Invalid idempotency header name, using default");
            DEFAULT_KEY_HEADER
        });
        Self {
            store,
            config,
            key_header,
        }
    }

    /// Store key for a client-supplied idempotency key.
    pub fn record_key(key: &str) -> String {
        format!("idempotency:{key}")
    }

    pub async fn lookup(&self, key: &str) -> Lookup {
        match self.store.get(&Self::record_key(key)).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<IdempotencyRecord>(&bytes) {
                Ok(record) => Lookup::Hit(record),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable idempotency record");
                    Lookup::Miss
                }
            },
            Ok(None) => Lookup::Miss,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Idempotency store unavailable, failing open");
                Lookup::Unavailable
            }
        }
    }

    async fn remember(&self, key: &str, response: &BufferedResponse) -> StoreResult<()> {
        let record = IdempotencyRecord::from_response(key, response);
        let bytes = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to encode idempotency record");
                return Ok(());
            }
        };
        self.store
            .set(&Self::record_key(key), bytes, self.config.ttl())
            .await
    }

    pub async fn handle(&self, request: Request<Body>, next: Next) -> Response {
        if !self.config.enabled || !is_mutating(request.method()) {
            return next.run(request).await;
        }

        let key = request
            .headers()
            .get(&self.key_header)
            .and_then(|v| v.to_str().ok())
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let Some(key) = key else {
            tracing::warn!(
                request_id = %request.request_id(),
                method = %request.method(),
                path = %request.uri().path(),
                "Mutating request without idempotency key; no replay protection"
            );
            metrics::record_idempotency("missing_key");
            return next.run(request).await;
        };

        let started = Instant::now();
        let lookup = self.lookup(&key).await;
        record_stage(&request, "idempotency", started.elapsed());

        match lookup {
            Lookup::Hit(record) => {
                tracing::info!(
                    request_id = %request.request_id(),
                    key = %key,
                    status = record.status_code,
                    "Replaying stored response"
                );
                metrics::record_idempotency("replayed");
                return record.into_replay();
            }
            Lookup::Unavailable => {
                metrics::record_idempotency("store_error");
                return next.run(request).await;
            }
            Lookup::Miss => {}
        }

        let request_id = request.request_id().to_string();
        let response = next.run(request).await;

        let status = response.status().as_u16();
        if !(200..400).contains(&status) {
            metrics::record_idempotency("not_recorded");
            return response;
        }

        match BufferedResponse::capture(response, self.config.max_body_bytes).await {
            Ok(Captured::Buffered(buffered)) => {
                match self.remember(&key, &buffered).await {
                    Ok(()) => {
                        tracing::debug!(request_id = %request_id, key = %key, status, "Idempotency record stored");
                        metrics::record_idempotency("stored");
                    }
                    Err(e) => {
                        tracing::warn!(request_id = %request_id, key = %key, error = %e, "Failed to store idempotency record");
                        metrics::record_idempotency("store_error");
                    }
                }
                buffered.into_response()
            }
            Ok(Captured::Streaming(response)) => {
                tracing::debug!(request_id = %request_id, key = %key, "Response too large to record");
                metrics::record_idempotency("not_recorded");
                response
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, key = %key, status = %e.status, error = %e, "Failed to read handler response");
                e.status.into_response()
            }
        }
    }
}

/// Axum middleware entry point.
pub async fn idempotency_middleware(
    State(guard): State<Arc<IdempotencyGuard>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    guard.handle(request, next).await
}
