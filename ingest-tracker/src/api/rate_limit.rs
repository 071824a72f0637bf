//! Rate admission middleware
//!
//! Callers are identified by peer address (`ConnectInfo`), then by the
//! first `X-Forwarded-For` entry, then collectively as "unknown".

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::error::ApiError;
use crate::services::Admission;
use crate::AppState;

pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-rate-limit-remaining");
pub const RETRY_AFTER_HEADER: HeaderName =
    HeaderName::from_static("x-rate-limit-retry-after-seconds");

pub fn client_identity(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(gate) = state.rate_gate.clone() else {
        return Ok(next.run(request).await);
    };

    let identity = client_identity(&request);
    match gate.try_acquire(&identity).await? {
        Admission::Allowed { remaining } => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(REMAINING_HEADER, HeaderValue::from(remaining));
            Ok(response)
        }
        Admission::Rejected { retry_after } => {
            tracing::info!(
                identity = %identity,
                path = %request.uri().path(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Request over rate limit"
            );
            Err(ApiError::TooManyRequests { retry_after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn identity_prefers_connect_info() {
        let mut request = Request::builder()
            .uri("/datasets/1/progress")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 51000))));

        assert_eq!(client_identity(&request), "10.0.0.2");
    }

    #[test]
    fn identity_falls_back_to_forwarded_for() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_identity(&request), "203.0.113.7");
    }

    #[test]
    fn identity_unknown_without_hints() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_identity(&request), "unknown");
    }
}
