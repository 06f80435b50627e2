use std::net::SocketAddr;
use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use limiter_core::{BucketState, OperationClass};

use crate::http::errors::RateLimitHttpError;
use crate::AppState;

/// Maps a request to the operation class whose budget it spends.
///
/// Path prefixes win over the method: the auth, upload, search, and bulk
/// surfaces have their own budgets regardless of verb; everything else is
/// read for safe methods and write for mutating ones.
pub fn classify(method: &Method, path: &str) -> OperationClass {
    if path.starts_with("/auth") {
        return OperationClass::Auth;
    }
    if path.starts_with("/uploads") {
        return OperationClass::Upload;
    }
    if path.starts_with("/search") || path.ends_with("/search") {
        return OperationClass::Search;
    }
    if path.ends_with("/bulk") {
        return OperationClass::Bulk;
    }
    if method == Method::GET || method == Method::HEAD {
        return OperationClass::Read;
    }
    OperationClass::Write
}

/// Opaque caller id from the auth layer, else the peer address. The gate
/// does not interpret it either way.
pub fn identity(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(|id| format!("user:{id}"))
        .unwrap_or_else(|| format!("ip:{}", addr.ip()))
}

pub fn attach_headers(response: &mut Response, snapshot: &BucketState) {
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(snapshot.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(snapshot.remaining));
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from(snapshot.reset_after.as_secs()),
    );
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();

    // Internal routes are never gated.
    if path.starts_with("/health") || path.starts_with("/metrics") || path.starts_with("/rate-limit")
    {
        return next.run(req).await;
    }

    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

    let class = classify(req.method(), path);
    let identity = identity(req.headers(), &addr);

    let span = tracing::info_span!("request", identity = %identity, class = %class);

    let snapshot = match state.gate.check(&identity, class) {
        Ok(snapshot) => {
            span.in_scope(|| {
                tracing::info!(decision = "allowed", remaining = snapshot.remaining)
            });
            snapshot
        }
        Err(err) => {
            state.metrics.record_denied(class);
            span.in_scope(|| {
                tracing::warn!(decision = "denied", retry_after_secs = err.retry_after)
            });

            let snapshot = state.gate.status(&identity, class);
            let mut response = RateLimitHttpError(err).into_response();
            attach_headers(&mut response, &snapshot);
            return response;
        }
    };

    state.metrics.total_allowed.fetch_add(1, Ordering::Relaxed);

    let mut response = next.run(req).await;
    attach_headers(&mut response, &snapshot);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_method_and_path() {
        assert_eq!(classify(&Method::GET, "/complaints"), OperationClass::Read);
        assert_eq!(classify(&Method::HEAD, "/complaints/42"), OperationClass::Read);
        assert_eq!(classify(&Method::POST, "/complaints"), OperationClass::Write);
        assert_eq!(classify(&Method::PATCH, "/complaints/42"), OperationClass::Write);
        assert_eq!(classify(&Method::DELETE, "/complaints/42"), OperationClass::Write);
        assert_eq!(classify(&Method::POST, "/complaints/bulk"), OperationClass::Bulk);
        assert_eq!(classify(&Method::GET, "/search"), OperationClass::Search);
        assert_eq!(classify(&Method::GET, "/complaints/search"), OperationClass::Search);
        assert_eq!(classify(&Method::POST, "/auth/refresh"), OperationClass::Auth);
        assert_eq!(classify(&Method::POST, "/uploads"), OperationClass::Upload);
        assert_eq!(classify(&Method::GET, "/uploads/att-1"), OperationClass::Upload);
    }

    #[test]
    fn identity_prefers_user_header_over_peer_ip() {
        let addr: SocketAddr = "10.1.2.3:55555".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("abc123"));
        assert_eq!(identity(&headers, &addr), "user:abc123");

        assert_eq!(identity(&HeaderMap::new(), &addr), "ip:10.1.2.3");
    }
}
