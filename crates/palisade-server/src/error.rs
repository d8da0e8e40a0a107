//! Application error types and Axum response conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use palisade_auth::Rejection;
use serde::Serialize;
use tracing::error;

/// Body sent for every unexpected failure. Details stay in the logs.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to process request";

/// Application-level errors with HTTP status code mapping.
#[derive(Debug)]
pub enum AppError {
    /// Credential check refused the request; the message is shown to the caller.
    Denied(Rejection),
    NotFound,
    MethodNotAllowed,
    /// Anything else. The detail is logged, never returned.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        AppError::Denied(rejection)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Denied(rejection) => (rejection.status, rejection.message).into_response(),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response()
            }
            AppError::Internal(detail) => {
                error!("Failed to process request: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: GENERIC_FAILURE_MESSAGE,
                    }),
                )
                    .into_response()
            }
        }
    }
}
