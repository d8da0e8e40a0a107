//! HTTP route handlers for the chat relay.

pub mod chat;

use axum::response::IntoResponse;

use crate::error::AppError;

/// Unknown path under the API prefix.
pub async fn not_found() -> impl IntoResponse {
    AppError::NotFound
}

/// Known API path, unsupported method.
pub async fn method_not_allowed() -> impl IntoResponse {
    AppError::MethodNotAllowed
}
