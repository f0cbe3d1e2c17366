//! Read-through response cache.
//!
//! # Flow
//! ```text
//! GET/HEAD → key = principal namespace + path?query
//!     hit  → cached body + content-type + x-cache-hit, handler bypassed
//!     miss → handler → 2xx → store with TTL → original response
//! ```
//!
//! # Design Decisions
//! - Only GET fills the cache; HEAD may be served from an entry but never
//!   creates one, so an empty HEAD body never shadows a GET body
//! - Entries written by authenticated callers are keyed by principal id and
//!   never served to anyone else
//! - Invalidation is explicit only: by exact key, or the whole store
//! - Store failures degrade to a pass-through, never to an error

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, HeaderName, Method, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::http::middleware::principal::Principal;
use crate::http::middleware::timing::record_stage;
use crate::http::response::{BufferedResponse, Captured};
use crate::observability::metrics;
use crate::store::{KeyedStore, StoreResult};

/// Marker header on responses served from the cache.
pub const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-cache-hit");

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedPayload {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl CachedPayload {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        headers.remove(header::CONTENT_TYPE);
        if let Some(value) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            headers.insert(header::CONTENT_TYPE, value);
        }
        headers.insert(CACHE_HIT_HEADER, HeaderValue::from_static("true"));
        response
    }
}

pub struct ReadThroughCache {
    store: Arc<dyn KeyedStore>,
    config: CacheConfig,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn KeyedStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// Cache key for a request URI as seen by `principal`.
    ///
    /// Write paths use this to compute the entry they need to invalidate.
    /// `%` and `:` in the principal id are percent-encoded, so an id can never
    /// run into the request target.
    pub fn cache_key(principal: Option<&Principal>, uri: &Uri) -> String {
        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        match principal {
            Some(p) => format!("cache:user:{}:{target}", escape_principal(&p.id)),
            None => format!("cache:public:{target}"),
        }
    }

    /// Drop a single entry by its exact key.
    pub async fn invalidate(&self, key: &str) -> StoreResult<()> {
        self.store.delete(key).await?;
        tracing::info!(key = %key, "Cache entry invalidated");
        Ok(())
    }

    /// Drop every entry in the backing store.
    pub async fn flush_all(&self) -> StoreResult<()> {
        self.store.flush_all().await?;
        tracing::warn!("Cache flushed");
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Option<CachedPayload> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache store unavailable, bypassing");
                metrics::record_cache_lookup("store_error");
                None
            }
        }
    }

    async fn fill(&self, key: &str, response: &BufferedResponse) {
        let payload = CachedPayload {
            status: response.status.as_u16(),
            content_type: response
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: response.body.to_vec(),
        };
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = self.store.set(key, bytes, self.config.ttl()).await {
            tracing::warn!(key = %key, error = %e, "Failed to fill cache entry");
        }
    }

    pub async fn handle(&self, request: Request<Body>, next: Next) -> Response {
        let method = request.method().clone();
        if !self.config.enabled || !(method == Method::GET || method == Method::HEAD) {
            return next.run(request).await;
        }

        let key = Self::cache_key(request.extensions().get::<Principal>(), request.uri());

        let started = Instant::now();
        let cached = self.lookup(&key).await;
        record_stage(&request, "cache", started.elapsed());

        if let Some(payload) = cached {
            tracing::debug!(key = %key, "Cache hit");
            metrics::record_cache_lookup("hit");
            return payload.into_response();
        }
        metrics::record_cache_lookup("miss");

        let response = next.run(request).await;
        if method != Method::GET || !response.status().is_success() {
            return response;
        }

        match BufferedResponse::capture(response, self.config.max_body_bytes).await {
            Ok(Captured::Buffered(buffered)) => {
                self.fill(&key, &buffered).await;
                buffered.into_response()
            }
            Ok(Captured::Streaming(response)) => response,
            Err(e) => {
                tracing::error!(key = %key, status = %e.status, error = %e, "Failed to read handler response");
                e.status.into_response()
            }
        }
    }
}

fn escape_principal(id: &str) -> String {
    let mut escaped = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Axum middleware entry point.
pub async fn read_cache_middleware(
    State(cache): State<Arc<ReadThroughCache>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    cache.handle(request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::principal::principal_middleware;
    use crate::store::MemoryStore;
    use axum::{middleware, routing::get, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        cache: Arc<ReadThroughCache>,
        calls: Arc<AtomicU32>,
        store: MemoryStore,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let cache = Arc::new(ReadThroughCache::new(
            Arc::new(store.clone()),
            CacheConfig::default(),
        ));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let app = Router::new()
            .route(
                "/products",
                get(move |request: Request<Body>| {
                    let counter = counter.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        let who = request
                            .headers()
                            .get("x-principal-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("anonymous")
                            .to_string();
                        axum::Json(serde_json::json!({ "render": n, "for": who }))
                    }
                }),
            )
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .layer(middleware::from_fn_with_state(cache.clone(), read_cache_middleware))
            .layer(middleware::from_fn(principal_middleware));
        Fixture {
            app,
            cache,
            calls,
            store,
        }
    }

    fn get_as(uri: &str, principal: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(id) = principal {
            builder = builder.header("x-principal-id", id);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_of(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_cache_key_shape() {
        let uri: Uri = "/products?page=2".parse().unwrap();
        assert_eq!(
            ReadThroughCache::cache_key(None, &uri),
            "cache:public:/products?page=2"
        );
        assert_eq!(
            ReadThroughCache::cache_key(Some(&Principal::new("u1")), &uri),
            "cache:user:u1:/products?page=2"
        );
    }

    #[test]
    fn test_principal_id_cannot_collide_with_target() {
        let root: Uri = "/".parse().unwrap();
        let odd_path: Uri = "/products:/".parse().unwrap();

        let tricky = ReadThroughCache::cache_key(Some(&Principal::new("alice:/products")), &root);
        let plain = ReadThroughCache::cache_key(Some(&Principal::new("alice")), &odd_path);
        assert_ne!(tricky, plain);
        assert_eq!(tricky, "cache:user:alice%3A/products:/");

        let percent = ReadThroughCache::cache_key(Some(&Principal::new("a%3Ab")), &root);
        assert_ne!(percent, ReadThroughCache::cache_key(Some(&Principal::new("a:b")), &root));
    }

    #[tokio::test]
    async fn test_oversized_handler_body_is_served_not_cached() {
        let store = MemoryStore::new();
        let cache = Arc::new(ReadThroughCache::new(
            Arc::new(store.clone()),
            CacheConfig {
                max_body_bytes: 4,
                ..CacheConfig::default()
            },
        ));
        let app = Router::new()
            .route("/big", get(|| async { "0123456789".to_string() }))
            .layer(middleware::from_fn_with_state(cache, read_cache_middleware));

        for _ in 0..2 {
            let response = app.clone().oneshot(get_as("/big", None)).await.unwrap();
            assert!(response.headers().get(CACHE_HIT_HEADER).is_none());
            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], b"0123456789");
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_hit_bypasses_handler() {
        let f = fixture();

        let first = f.app.clone().oneshot(get_as("/products", None)).await.unwrap();
        assert!(first.headers().get(CACHE_HIT_HEADER).is_none());
        let first_body = json_of(first).await;

        let second = f.app.clone().oneshot(get_as("/products", None)).await.unwrap();
        assert_eq!(second.headers()[CACHE_HIT_HEADER], "true");
        assert_eq!(second.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(json_of(second).await, first_body);

        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entries_are_isolated_per_principal() {
        let f = fixture();

        let alice = json_of(f.app.clone().oneshot(get_as("/products", Some("alice"))).await.unwrap()).await;
        let bob = f.app.clone().oneshot(get_as("/products", Some("bob"))).await.unwrap();
        assert!(bob.headers().get(CACHE_HIT_HEADER).is_none());
        let bob = json_of(bob).await;

        assert_eq!(alice["for"], "alice");
        assert_eq!(bob["for"], "bob");
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);

        let alice_again = f.app.clone().oneshot(get_as("/products", Some("alice"))).await.unwrap();
        assert_eq!(alice_again.headers()[CACHE_HIT_HEADER], "true");
        assert_eq!(json_of(alice_again).await["for"], "alice");
    }

    #[tokio::test]
    async fn test_query_is_part_of_key() {
        let f = fixture();
        f.app.clone().oneshot(get_as("/products?page=1", None)).await.unwrap();
        let other = f.app.clone().oneshot(get_as("/products?page=2", None)).await.unwrap();
        assert!(other.headers().get(CACHE_HIT_HEADER).is_none());
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let f = fixture();
        f.app.clone().oneshot(get_as("/products", None)).await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;

        let response = f.app.clone().oneshot(get_as("/products", None)).await.unwrap();
        assert!(response.headers().get(CACHE_HIT_HEADER).is_none());
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_flush() {
        let f = fixture();
        f.app.clone().oneshot(get_as("/products", None)).await.unwrap();
        f.app.clone().oneshot(get_as("/products", Some("alice"))).await.unwrap();
        assert_eq!(f.store.len(), 2);

        let uri: Uri = "/products".parse().unwrap();
        f.cache
            .invalidate(&ReadThroughCache::cache_key(None, &uri))
            .await
            .unwrap();
        assert_eq!(f.store.len(), 1);

        let refreshed = f.app.clone().oneshot(get_as("/products", None)).await.unwrap();
        assert!(refreshed.headers().get(CACHE_HIT_HEADER).is_none());

        f.cache.flush_all().await.unwrap();
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let f = fixture();
        for _ in 0..2 {
            let response = f.app.clone().oneshot(get_as("/missing", None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert!(response.headers().get(CACHE_HIT_HEADER).is_none());
        }
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_passes_through() {
        let f = fixture();
        f.store.set_available(false);

        for _ in 0..2 {
            let response = f.app.clone().oneshot(get_as("/products", None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(CACHE_HIT_HEADER).is_none());
        }
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_head_does_not_fill() {
        let f = fixture();
        let head = Request::head("/products").body(Body::empty()).unwrap();
        f.app.clone().oneshot(head).await.unwrap();
        assert!(f.store.is_empty());
    }
}
