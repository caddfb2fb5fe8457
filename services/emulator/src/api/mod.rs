//! HTTP API handlers and application assembly.

pub mod auth;
pub mod engine;
pub mod error;
pub mod registry;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use mobymock_image::{BackingArtifact, ImageStore, TarballImage};

use crate::api::auth::Auth;
use crate::api::error::ApiError;
use crate::mux::Mux;

/// Materialize an artifact's image off the request thread.
pub(crate) async fn load_image(artifact: &BackingArtifact) -> Result<Arc<TarballImage>, ApiError> {
    let artifact = artifact.clone();
    tokio::task::spawn_blocking(move || artifact.load())
        .await
        .map_err(|err| ApiError::unavailable(format!("image load task failed: {err}")))?
        .map_err(ApiError::from)
}

/// Encode a JSON response body; an encode failure is a server-side data
/// problem.
pub(crate) fn json_response<T: Serialize>(value: &T) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(value)
        .map_err(|err| ApiError::unavailable(format!("unable to encode JSON: {err}")))?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_default())
}

/// Assemble the engine application: image routes plus the `/_ping`
/// catch-all reporting the configured API version.
pub fn engine_app(store: ImageStore, api_version: String) -> Router {
    let mut mux = Mux::new();
    engine::EngineRouter::new(Arc::new(store)).register(&mut mux);

    mux.get_exact(r"/_ping", move |_vars, _req: Request<Body>| {
        let api_version = api_version.clone();
        async move {
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Api-Version", api_version)
                .body(Body::empty())
                .unwrap_or_default())
        }
    });

    dispatch_router(mux).layer(TraceLayer::new_for_http())
}

/// Assemble the registry application: token route, distribution routes, and
/// the bearer gate when a credential is configured.
pub fn registry_app(store: ImageStore, auth: Auth) -> Router {
    let mut mux = Mux::new();
    auth::AuthRouter::new(auth.clone()).register(&mut mux);
    registry::RegistryRouter::new(Arc::new(store)).register(&mut mux);

    let router = dispatch_router(mux);
    let router = if auth.is_valid() {
        router.layer(axum::middleware::from_fn_with_state(
            auth,
            auth::require_bearer,
        ))
    } else {
        router
    };
    router.layer(TraceLayer::new_for_http())
}

fn dispatch_router(mux: Mux) -> Router {
    let mux = Arc::new(mux);
    Router::new().fallback(move |req: Request<Body>| {
        let mux = Arc::clone(&mux);
        async move { mux.dispatch(req).await }
    })
}
