//! Error types for ingest-tracker
//!
//! `TrackerError` is what the core returns. Callers must be able to tell an
//! unknown dataset (their mistake) from an unreachable store (retry later),
//! so the two never collapse into one variant. `ApiError` maps both onto
//! HTTP status codes.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::models::DatasetId;

/// Core error type
#[derive(Debug, Error)]
pub enum TrackerError {
    /// An unknown dataset id was supplied
    #[error("Dataset not found: {0}")]
    DatasetNotFound(DatasetId),

    /// Ledger, dataset store or lock table unreachable; retryable
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ingest_common::Error> for TrackerError {
    fn from(err: ingest_common::Error) -> Self {
        if err.is_storage_unavailable() {
            return TrackerError::StorageUnavailable(err.to_string());
        }
        match err {
            ingest_common::Error::InvalidInput(msg) => TrackerError::InvalidInput(msg),
            other => TrackerError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for TrackerError {
    fn from(err: sqlx::Error) -> Self {
        ingest_common::Error::Database(err).into()
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400), including unknown dataset ids
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Rate gate exhausted (429)
    #[error("Too many requests, retry in {} s", retry_after.as_secs())]
    TooManyRequests { retry_after: Duration },

    /// Backing store unreachable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::DatasetNotFound(id) => {
                ApiError::BadRequest(format!("Dataset {} does not exist", id))
            }
            TrackerError::InvalidInput(msg) => ApiError::BadRequest(msg),
            TrackerError::StorageUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            TrackerError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ingest_common::Error> for ApiError {
    fn from(err: ingest_common::Error) -> Self {
        TrackerError::from(err).into()
    }
}

/// Whole seconds for a `Retry-After` header, never less than one
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            ApiError::TooManyRequests { retry_after } => Some(retry_after_secs(*retry_after)),
            ApiError::ServiceUnavailable(_) => Some(5),
            _ => None,
        };

        let (status, error_code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::TooManyRequests { .. } => (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS"),
            ApiError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
                "retryable": retry_after.is_some(),
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            let value = HeaderValue::from(secs);
            response.headers_mut().insert(header::RETRY_AFTER, value.clone());
            if status == StatusCode::TOO_MANY_REQUESTS {
                response
                    .headers_mut()
                    .insert(crate::api::rate_limit::RETRY_AFTER_HEADER, value);
            }
        }
        response
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_dataset_is_bad_request() {
        let api: ApiError = TrackerError::DatasetNotFound(DatasetId(7)).into();
        assert_eq!(api.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_unavailable_is_retryable_503() {
        let api: ApiError = TrackerError::StorageUnavailable("pool timed out".into()).into();
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[test]
    fn pool_timeout_maps_to_storage_unavailable() {
        let err: TrackerError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, TrackerError::StorageUnavailable(_)));
    }

    #[test]
    fn protocol_error_is_internal_not_retryable() {
        let err: TrackerError = sqlx::Error::Protocol("unexpected frame".to_string()).into();
        assert!(matches!(err, TrackerError::Internal(_)));

        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.headers().contains_key(header::RETRY_AFTER));
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }
}
