//! Chat forwarding service - message preparation and response relay.

use axum::{body::Body, http::HeaderName, response::Response};
use futures::TryStreamExt;
use palisade_config::{IdentityPropagation, Settings};
use palisade_core::{ChatMessage, ChatRequestBody, GatewayError, Identity};
use palisade_llm::{InferenceRequest, RawResponse};
use tracing::{error, info};

use crate::state::AppState;

/// Connection-scoped headers that must not be copied onto our response.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// System message announcing the verified caller to the model.
pub fn identity_message(identity: &Identity) -> ChatMessage {
    ChatMessage::system(format!(
        "The user in this conversation is authenticated as {}.",
        identity.label()
    ))
}

/// Applies the default system prompt and, when enabled, the identity note.
///
/// The default prompt is added only when no system message is present. The
/// identity note, if any, ends up first.
pub fn prepare_messages(
    mut messages: Vec<ChatMessage>,
    settings: &Settings,
    identity: &Identity,
) -> Vec<ChatMessage> {
    if !messages.iter().any(ChatMessage::is_system) {
        messages.insert(0, ChatMessage::system(&settings.system_prompt));
    }
    if settings.identity_propagation == IdentityPropagation::Enabled {
        messages.insert(0, identity_message(identity));
    }
    messages
}

/// Builds the streaming inference call for a prepared conversation.
pub fn build_request(settings: &Settings, messages: Vec<ChatMessage>) -> InferenceRequest {
    InferenceRequest {
        model: settings.model_id.clone(),
        messages,
        max_tokens: settings.max_tokens,
        stream: true,
        gateway: settings.gateway.clone(),
    }
}

/// Parses the body, prepares the conversation and starts inference.
pub async fn forward(
    state: &AppState,
    identity: &Identity,
    raw_body: &[u8],
) -> Result<RawResponse, GatewayError> {
    let messages = ChatRequestBody::from_slice(raw_body)?.into_messages();
    let messages = prepare_messages(messages, &state.settings, identity);

    info!(
        "Chat request (model: {}, messages: {})",
        state.settings.model_id,
        messages.len()
    );

    state.backend.run(build_request(&state.settings, messages)).await
}

/// Turns the backend's response into ours without buffering the body.
pub fn relay(raw: RawResponse) -> Response {
    let body = raw
        .body
        .inspect_err(|e| error!("Inference stream broke: {}", e));

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = raw.status;

    let headers = response.headers_mut();
    for (name, value) in raw.headers.iter() {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    response
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}
