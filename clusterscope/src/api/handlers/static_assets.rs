//! HTTP handler for the embedded dashboard shell.

use axum::{
    body::Body,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::static_assets::Assets;

fn asset_response(path: &str, data: Vec<u8>) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    // Hashed build output can be cached forever; everything else is revalidated
    let cache_control = if path.starts_with("assets/") {
        "public, max-age=31536000, immutable"
    } else {
        "no-cache"
    };

    (
        [(header::CONTENT_TYPE, mime.as_ref().to_string()), (header::CACHE_CONTROL, cache_control.to_string())],
        Body::from(data),
    )
        .into_response()
}

/// Serve embedded static assets, falling back to `index.html` for client-side routes.
#[instrument]
pub async fn serve_embedded_asset(uri: Uri) -> Response {
    let mut path = uri.path().trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        path = "index.html";
    }

    if let Some(content) = Assets::get(path) {
        return asset_response(path, content.data.into_owned());
    }

    debug!("No embedded asset for {}, serving the app shell", uri.path());
    match Assets::get("index.html") {
        Some(index) => asset_response("index.html", index.data.into_owned()),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
