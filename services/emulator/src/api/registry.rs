//! Registry Distribution API routes: ping, manifests, blobs.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use mobymock_image::{Digest, ImageStore};

use crate::api::error::ApiError;
use crate::api::load_image;
use crate::mux::{Mux, Vars};

const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

pub struct RegistryRouter {
    store: Arc<ImageStore>,
}

impl RegistryRouter {
    pub fn new(store: Arc<ImageStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    pub fn register(self: &Arc<Self>, mux: &mut Mux) {
        let router = Arc::clone(self);
        mux.get(r"/", move |vars, req| {
            let router = Arc::clone(&router);
            async move { router.ping(vars, req).await }
        });

        let router = Arc::clone(self);
        mux.get(
            r"/(?P<name>.+)/manifests/(?P<reference>[^/]+)",
            move |vars, req| {
                let router = Arc::clone(&router);
                async move { router.manifest(vars, req).await }
            },
        );

        let router = Arc::clone(self);
        mux.get(
            r"/(?P<name>.+)/blobs/(?P<digest>[^/]+)",
            move |vars, req| {
                let router = Arc::clone(&router);
                async move { router.blob(vars, req).await }
            },
        );
    }

    /// `GET /v2/`: 200 only for API major version 2.
    async fn ping(&self, vars: Vars, _req: Request<Body>) -> Result<Response, ApiError> {
        let version = vars.get("version").map(String::as_str).unwrap_or_default();
        match version {
            "2" => Ok(StatusCode::OK.into_response()),
            other => Err(ApiError::not_implemented(format!(
                "unknown version: v{other}"
            ))),
        }
    }

    /// `GET /{name}/manifests/{reference}`: the recomputed manifest bytes.
    async fn manifest(&self, vars: Vars, _req: Request<Body>) -> Result<Response, ApiError> {
        let version = vars.get("version").map(String::as_str).unwrap_or_default();
        let name = &vars["name"];
        let reference = &vars["reference"];

        // Digest references key with `@`, tags with `:`.
        let image_name = if reference.starts_with("sha256:") {
            format!("v{version}/{name}@{reference}")
        } else {
            format!("v{version}/{name}:{reference}")
        };
        let Some(artifact) = self.store.resolve(&image_name) else {
            return Err(ApiError::not_found(format!("unknown image: {image_name}")));
        };

        let image = load_image(artifact).await?;
        let manifest = image.manifest();
        let body = manifest.to_bytes().map_err(ApiError::from)?;

        debug!(image = %image_name, media_type = %manifest.media_type, "Serving manifest");
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, manifest.media_type.clone())
            .body(Body::from(body))
            .unwrap_or_default())
    }

    /// `GET /{name}/blobs/{digest}`: raw config or layer bytes.
    ///
    /// Every image stored under the repository name is a candidate; a digest
    /// matching neither the config nor any layer of one candidate just moves
    /// the scan to the next. Candidate order is the map's, which is
    /// unspecified.
    async fn blob(&self, vars: Vars, _req: Request<Body>) -> Result<Response, ApiError> {
        let version = vars.get("version").map(String::as_str).unwrap_or_default();
        let name = &vars["name"];
        let digest_param = &vars["digest"];

        let image_name = format!("v{version}/{name}");
        let candidates: Vec<_> = self
            .store
            .resolve_by_prefix(&image_name)
            .cloned()
            .collect();

        for artifact in candidates {
            let digest = Digest::parse(digest_param).map_err(ApiError::from)?;
            let image = load_image(&artifact).await?;

            // The config blob, then the layers.
            if image.config_digest() == &digest {
                return Ok(blob_response(&digest, image.raw_config().to_vec()));
            }
            if let Some(layer) = image.layer_by_digest(&digest) {
                return Ok(blob_response(&digest, layer.bytes.clone()));
            }
            // Not in this candidate; try the next image under the name.
        }

        Err(ApiError::not_found(format!("unknown image: {image_name}")))
    }
}

fn blob_response(digest: &Digest, bytes: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(DOCKER_CONTENT_DIGEST, digest.as_str())
        .body(Body::from(bytes))
        .unwrap_or_default()
}
