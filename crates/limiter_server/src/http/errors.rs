use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use limiter_core::RateLimitError;
use serde_json::json;

/// 429 mapping of a denied admission, with `Retry-After` in whole seconds.
pub struct RateLimitHttpError(pub RateLimitError);

impl IntoResponse for RateLimitHttpError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": "rate_limited",
            "operation_class": self.0.operation_class,
            "retry_after_secs": self.0.retry_after,
        }));

        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(self.0.retry_after));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limiter_core::OperationClass;

    #[test]
    fn denial_maps_to_429_with_retry_after() {
        let response = RateLimitHttpError(RateLimitError {
            operation_class: OperationClass::Write,
            retry_after: 2,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("2"))
        );
    }
}
