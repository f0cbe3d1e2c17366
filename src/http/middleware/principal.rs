//! Authenticated principal extraction.
//!
//! Authentication itself happens upstream. This layer only reads the principal
//! id the authenticating gateway forwards and attaches it to the request so the
//! read-through cache can namespace entries per caller.

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::Response,
};

/// Header set by the authenticating gateway. The gateway must strip any
/// client-supplied copy.
pub const X_PRINCIPAL_ID: &str = "x-principal-id";

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Attach a [`Principal`] when the gateway forwarded one.
pub async fn principal_middleware(mut request: Request<Body>, next: Next) -> Response {
    let principal = request
        .headers()
        .get(X_PRINCIPAL_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(Principal::new);

    if let Some(principal) = principal {
        request.extensions_mut().insert(principal);
    }
    next.run(request).await
}
