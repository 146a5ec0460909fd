//! Error type for the HTTP surface.

use crate::error::{CredentialError, EventBusError, FeedError, SnapshotError};
use crate::mobile::ErrorDetails;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// API error type that converts to HTTP responses.
///
/// The response carries [`ErrorDetails`] so the mobile adapter can rewrite
/// it into the mobile error envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    SnapshotUnavailable(String),

    #[error("{0}")]
    CredentialStore(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::SnapshotUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::CredentialStore(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::SnapshotUnavailable(_) => "SNAPSHOT_UNAVAILABLE",
            ApiError::CredentialStore(_) => "CREDENTIAL_STORE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        ErrorDetails::new(self.to_string())
            .with_code(self.code())
            .into_response(status)
    }
}

impl From<SnapshotError> for ApiError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::DevModePersist(_) => ApiError::Internal(e.to_string()),
            _ => ApiError::SnapshotUnavailable(e.to_string()),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        ApiError::CredentialStore(e.to_string())
    }
}

impl From<FeedError> for ApiError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Malformed { .. } => ApiError::BadRequest(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<EventBusError> for ApiError {
    fn from(e: EventBusError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_carries_details() {
        let response = ApiError::SnapshotUnavailable("stats returned HTTP 503".to_string())
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let details = response.extensions().get::<ErrorDetails>().unwrap();
        assert_eq!(details.message, "stats returned HTTP 503");
        assert_eq!(details.code.as_deref(), Some("SNAPSHOT_UNAVAILABLE"));
    }

    #[test]
    fn test_malformed_feed_input_is_bad_request() {
        let error: ApiError = FeedError::Malformed {
            details: "workflow event has no type".to_string(),
        }
        .into();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }
}
