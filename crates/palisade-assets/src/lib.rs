//! Chat frontend embedded into the binary and served by path.

use axum::{
    body::Body,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "public"]
struct Assets;

const INDEX: &str = "index.html";

/// Fallback handler: serves the embedded file matching the request path.
pub async fn serve(uri: Uri) -> Response {
    asset_response(uri.path())
}

/// Resolves `path` to an embedded file. `/` maps to `index.html`; anything
/// not embedded is 404.
pub fn asset_response(path: &str) -> Response {
    let path = match path.trim_start_matches('/') {
        "" => INDEX,
        p => p,
    };

    let Some(asset) = Assets::get(path) else {
        return not_found();
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        Body::from(asset.data.into_owned()),
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}
