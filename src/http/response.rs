//! Response capture.
//!
//! # Responsibilities
//! - Buffer a handler's final response so middleware can inspect and store it
//! - Rebuild an equivalent response for the client afterwards
//! - Leave oversized responses streaming, untouched
//!
//! # Design Decisions
//! - Interception happens on the returned `Response` value after the handler
//!   finishes; nothing in the framework is patched
//! - Declared `content-length` and the body size hint are checked before
//!   reading; unknown-length bodies are read no further than the limit

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use futures_util::{stream, StreamExt};
use http_body::Body as HttpBody;
use thiserror::Error;

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Result of trying to buffer a response.
#[derive(Debug)]
pub enum Captured {
    /// The body was read into memory.
    Buffered(BufferedResponse),
    /// The body exceeds the limit; the response is returned with its full body.
    Streaming(Response),
}

/// The handler's body failed mid-read. Its status is kept for the client.
#[derive(Debug, Error)]
#[error("failed to read response body: {source}")]
pub struct CaptureError {
    pub status: StatusCode,
    #[source]
    pub source: axum::Error,
}

impl BufferedResponse {
    /// Buffer `response` unless its body is larger than `limit` bytes.
    ///
    /// Declared length and the body's size hint are checked first. Bodies of
    /// unknown size are read up to `limit`; on overflow the bytes read so far
    /// are chained back in front of the rest of the stream.
    pub async fn capture(response: Response, limit: usize) -> Result<Captured, CaptureError> {
        let limit_u64 = limit as u64;
        let hinted = response.body().size_hint().lower();
        if hinted > limit_u64 || declared_length(response.headers()).is_some_and(|len| len > limit) {
            return Ok(Captured::Streaming(response));
        }

        let (parts, body) = response.into_parts();
        let mut data = body.into_data_stream();
        let mut chunks: Vec<Bytes> = Vec::new();
        let mut read = 0usize;

        while let Some(chunk) = data.next().await {
            let chunk = chunk.map_err(|source| CaptureError {
                status: parts.status,
                source,
            })?;
            read += chunk.len();
            chunks.push(chunk);
            if read > limit {
                let head = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
                let body = Body::from_stream(head.chain(data));
                return Ok(Captured::Streaming(Response::from_parts(parts, body)));
            }
        }

        let body = match chunks.len() {
            0 => Bytes::new(),
            1 => chunks.swap_remove(0),
            _ => Bytes::from(chunks.concat()),
        };
        Ok(Captured::Buffered(Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }))
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
