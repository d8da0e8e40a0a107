//! Router setup.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::{any, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::state::AppState;

pub const CHAT_PATH: &str = "/api/chat";

/// Builds the application router.
///
/// `/api/chat` accepts POST only; other `/api/*` paths are 404. Everything
/// else, `/` included, is answered by the embedded frontend.
pub fn build_router(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let api_routes = Router::new()
        .route(
            CHAT_PATH,
            post(handlers::chat::chat).fallback(handlers::method_not_allowed),
        )
        .route("/api/", any(handlers::not_found))
        .route("/api/{*rest}", any(handlers::not_found));

    Router::new()
        .merge(api_routes)
        .fallback(palisade_assets::serve)
        .layer(trace_layer)
        .with_state(state)
}
