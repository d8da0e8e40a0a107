//! Inference backend access for palisade.
//!
//! - [`InferenceBackend`] — The seam the chat handler calls through
//! - [`InferenceRequest`] / [`RawResponse`] — One call and its unbuffered reply
//! - [`WorkersAiClient`] — REST client for hosted models, with optional gateway routing
//!
//! # Streaming
//!
//! ```rust,ignore
//! use palisade_llm::{InferenceBackend, InferenceRequest, WorkersAiClient};
//! use futures::StreamExt;
//!
//! let client = WorkersAiClient::new(&account_id, &api_token);
//! let mut raw = client.run(InferenceRequest {
//!     model: "@cf/meta/llama-3.3-70b-instruct-fp8-fast".into(),
//!     messages,
//!     max_tokens: 1024,
//!     stream: true,
//!     gateway: None,
//! }).await?;
//!
//! while let Some(chunk) = raw.body.next().await {
//!     print!("{}", String::from_utf8_lossy(&chunk?));
//! }
//! ```

mod backend;
mod workers_ai;

pub use backend::{ByteStream, InferenceBackend, InferenceRequest, RawResponse};
pub use workers_ai::{WorkersAiClient, DEFAULT_API_BASE, DEFAULT_GATEWAY_BASE};
