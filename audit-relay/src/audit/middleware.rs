//! Audit middleware for HTTP request/response correlation
//!
//! Buffers the request body, hands it to the [`AuditCorrelator`], runs the
//! inner service, then buffers the response body so the audit record can
//! carry both. Excluded routes and disabled auditing pass straight through.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use futures::{stream, StreamExt};

use super::correlator::AuditCorrelator;

/// Audit middleware function
///
/// Install with `axum::middleware::from_fn_with_state(correlator, audit_middleware)`.
///
/// 1. Skipped when auditing is disabled or the path matches `excluded_routes`
/// 2. Request bodies above `max_body_bytes`, declared or streamed, are passed through unaudited
/// 3. A response body that fails mid-read reaches the client unchanged, audited with a `null` response
/// 4. Streaming responses (`text/event-stream`) are audited with a `null` response
pub async fn audit_middleware(
    State(correlator): State<AuditCorrelator>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let config = correlator.config();

    if !correlator.is_enabled() || path_matches_patterns(&path, &config.excluded_routes) {
        return next.run(request).await;
    }

    let max_body_bytes = config.max_body_bytes;
    if declared_length(request.headers()).is_some_and(|len| len > max_body_bytes as u64) {
        tracing::debug!(path = %path, "Request body exceeds audit limit, skipping audit");
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let raw_body = match buffer_body(body, max_body_bytes).await {
        Buffered::Complete(bytes) => bytes,
        Buffered::Partial(body) => {
            tracing::debug!(path = %path, "Request body not auditable, skipping audit");
            return next.run(Request::from_parts(parts, body)).await;
        }
    };

    let state = correlator.on_ingress(raw_body.clone());
    let mut request = Request::from_parts(parts, Body::from(raw_body));
    if let Some(state) = &state {
        request.extensions_mut().insert(state.clone());
    }

    let response = next.run(request).await;
    let status = response.status().as_u16();

    if is_event_stream(response.headers()) {
        correlator.on_egress(state.as_ref(), &path, status, Bytes::new());
        return response;
    }

    let (parts, body) = response.into_parts();
    match buffer_body(body, usize::MAX).await {
        Buffered::Complete(response_body) => {
            correlator.on_egress(state.as_ref(), &path, status, response_body.clone());
            Response::from_parts(parts, Body::from(response_body))
        }
        Buffered::Partial(body) => {
            tracing::warn!(path = %path, "Failed to read response body for audit");
            correlator.on_egress(state.as_ref(), &path, status, Bytes::new());
            Response::from_parts(parts, body)
        }
    }
}

enum Buffered {
    Complete(Bytes),
    /// Buffering stopped early; the body replays what was read, then the rest
    Partial(Body),
}

/// Collect a body of at most `limit` bytes
///
/// On overflow or a read error the chunks already pulled are stitched back in
/// front of the remaining stream, so the consumer sees the same bytes (or
/// the same error) it would have seen without auditing.
async fn buffer_body(body: Body, limit: usize) -> Buffered {
    let mut chunks = body.into_data_stream();
    let mut buffered = Vec::new();

    while let Some(frame) = chunks.next().await {
        let frame = match frame {
            Ok(chunk) if buffered.len().saturating_add(chunk.len()) <= limit => {
                buffered.extend_from_slice(&chunk);
                continue;
            }
            frame => frame,
        };

        let replay = stream::iter([Ok(Bytes::from(buffered)), frame]);
        return Buffered::Partial(Body::from_stream(replay.chain(chunks)));
    }

    Buffered::Complete(Bytes::from(buffered))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"))
}

/// Check if a path matches any of the given glob patterns
///
/// Supports simple wildcard matching:
/// - `*` matches any single path segment
/// - `**` or trailing `/*` matches any remaining segments
pub fn path_matches_patterns(path: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|pattern| path_matches_glob(path, pattern))
}

/// Simple glob matching for route patterns
fn path_matches_glob(path: &str, pattern: &str) -> bool {
    if path == pattern {
        return true;
    }

    // "/internal/*" matches "/internal/anything"
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path.starts_with(prefix) && path.len() > prefix.len();
    }
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return path.starts_with(prefix);
    }

    if let Some((head, tail)) = pattern.split_once('*') {
        if !tail.contains('*') {
            return path.len() >= head.len() + tail.len()
                && path.starts_with(head)
                && path.ends_with(tail);
        }
    }

    false
}
