//! The inference backend seam and its request/response types.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, StatusCode};
use palisade_core::{ChatMessage, GatewayError, GatewayRoute};

/// Response body chunks exactly as the backend produced them.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>;

/// A single inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    /// Ask for an incremental (event-stream) response instead of a buffered one.
    pub stream: bool,
    pub gateway: Option<GatewayRoute>,
}

/// An unbuffered backend response, relayed to the caller as-is.
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Something that can run a chat completion and hand back its raw stream.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn run(&self, request: InferenceRequest) -> Result<RawResponse, GatewayError>;
}
