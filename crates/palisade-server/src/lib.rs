//! Access-gated chat relay: routes requests, verifies callers, and streams
//! model output from the inference backend.

mod app;
mod error;
mod handlers;
mod services;
mod state;

pub use app::{build_router, CHAT_PATH};
pub use error::{AppError, GENERIC_FAILURE_MESSAGE};
pub use services::chat::{build_request, identity_message, prepare_messages, relay};
pub use state::AppState;
