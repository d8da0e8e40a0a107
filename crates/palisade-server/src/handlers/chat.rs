//! Streaming chat relay handler.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use palisade_auth::VerificationOutcome;

use crate::error::AppError;
use crate::services::chat::{forward, relay};
use crate::state::AppState;

/// Verifies the caller, then relays the model's streamed reply.
///
/// The body is taken raw so that malformed JSON goes through the generic
/// failure path instead of the extractor's own rejection.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = match state.verifier.verify(&headers).await {
        VerificationOutcome::Authenticated(identity) => identity,
        VerificationOutcome::Rejected(rejection) => {
            return AppError::from(rejection).into_response()
        }
    };

    match forward(&state, &identity, &body).await {
        Ok(raw) => relay(raw),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}
