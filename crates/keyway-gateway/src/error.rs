use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keyway_core::ShortenerError;
use tracing::{error, warn};

use crate::model::ErrorResponse;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    Shortener(ShortenerError),
    NotFound(String),
}

impl From<ShortenerError> for AppError {
    fn from(value: ShortenerError) -> Self {
        Self::Shortener(value)
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Shortener(e) => match e {
                ShortenerError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
                ShortenerError::InvalidAlias(_) => (StatusCode::BAD_REQUEST, "invalid_alias"),
                ShortenerError::InvalidExpiration(_) => {
                    (StatusCode::BAD_REQUEST, "invalid_expiration")
                }
                ShortenerError::MalformedKey(_) => (StatusCode::BAD_REQUEST, "malformed_key"),
                ShortenerError::AliasTaken(_) => (StatusCode::CONFLICT, "alias_taken"),
                ShortenerError::AllocatorInvariantViolated { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "allocator_invariant_violated",
                ),
                other if other.is_retryable() => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::NotFound(key) => format!("no mapping for key '{key}'"),
            AppError::Shortener(e) => e.to_string(),
        };

        if status == StatusCode::SERVICE_UNAVAILABLE {
            warn!(error = %message, "request failed on a transient error");
        } else if status.is_server_error() {
            error!(error = %message, "request failed");
        }

        let body = ErrorResponse {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyway_core::{AllocatorError, StorageError};

    fn status(e: ShortenerError) -> StatusCode {
        AppError::from(e).into_response().status()
    }

    #[test]
    fn maps_errors_to_status_codes() {
        assert_eq!(
            status(ShortenerError::AliasTaken("promo".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(ShortenerError::MalformedKey("!!".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ShortenerError::AllocatorInvariantViolated {
                key: "abc".into(),
                id: 1
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(StorageError::Unavailable("down".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ShortenerError::Timeout("abc".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(AllocatorError::Exhausted("empty".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::NotFound("abc".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
