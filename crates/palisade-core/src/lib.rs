//! Core domain types and error definitions for palisade.
//!
//! This crate provides the types shared across the palisade workspace:
//!
//! - [`GatewayError`] — Error type for request parsing and inference calls
//! - [`ChatMessage`] and [`ChatRole`] — Conversation message types
//! - [`ChatRequestBody`] — Body accepted by the chat endpoint
//! - [`Identity`] — Caller identity derived from a verified access token
//! - [`GatewayRoute`] — Optional routing of inference through a named gateway
//!
//! # Example
//!
//! ```rust
//! use palisade_core::{ChatMessage, ChatRequestBody, ChatRole};
//!
//! let body: ChatRequestBody =
//!     serde_json::from_str(r#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap();
//! let messages = body.into_messages();
//!
//! assert_eq!(messages, vec![ChatMessage::user("hi")]);
//! assert_eq!(messages[0].role, ChatRole::User);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker used when an identity carries neither an email nor a subject.
pub const ANONYMOUS_IDENTITY_LABEL: &str = "authenticated user";

/// Errors that can occur while handling a chat request.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The request body could not be parsed.
    #[error("Failed to parse request body: {0}")]
    InvalidBody(String),

    /// The inference request could not be sent or its stream broke.
    #[error("Inference request failed: {0}")]
    Inference(String),

    /// The inference endpoint answered with a non-success status.
    #[error("Inference endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InvalidBody(err.to_string())
    }
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions steering the model, conventionally first.
    System,
    /// Message from the user.
    User,
    /// Message from the assistant/LLM.
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: ChatRole,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Creates a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Creates a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == ChatRole::System
    }
}

/// Request body for the chat endpoint.
///
/// A missing or `null` `messages` field is treated as an empty conversation.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
}

impl ChatRequestBody {
    /// Parses a raw request body.
    pub fn from_slice(raw: &[u8]) -> Result<Self, GatewayError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages.unwrap_or_default()
    }
}

/// Identity of a caller whose access token was verified.
///
/// Both fields are optional; a token without either is still authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: Option<String>,
    pub subject: Option<String>,
}

impl Identity {
    /// Returns the email, else the subject, else [`ANONYMOUS_IDENTITY_LABEL`].
    pub fn label(&self) -> &str {
        self.email
            .as_deref()
            .or(self.subject.as_deref())
            .unwrap_or(ANONYMOUS_IDENTITY_LABEL)
    }
}

/// Routing of inference calls through a named gateway with cache controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRoute {
    /// Gateway name.
    pub id: String,
    /// Ask the gateway to bypass its response cache.
    #[serde(default)]
    pub skip_cache: bool,
    /// Cache lifetime in seconds for responses stored by the gateway.
    #[serde(default)]
    pub cache_ttl: Option<u64>,
}
