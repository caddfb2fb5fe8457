//! Engine API image routes: inspect, raw export, history.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use mobymock_archive as archive;
use mobymock_image::{history, inspect, ImageStore};

use crate::api::error::ApiError;
use crate::api::{json_response, load_image};
use crate::mux::{Mux, Vars};

const EXPORT_CHUNK_SIZE: usize = 32 * 1024;

pub struct EngineRouter {
    store: Arc<ImageStore>,
}

impl EngineRouter {
    pub fn new(store: Arc<ImageStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    pub fn register(self: &Arc<Self>, mux: &mut Mux) {
        let router = Arc::clone(self);
        mux.get(r"/images/(?P<name>.+)/json", move |vars, req| {
            let router = Arc::clone(&router);
            async move { router.image_inspect(vars, req).await }
        });

        let router = Arc::clone(self);
        mux.get(r"/images/(?P<name>.+)/get", move |vars, req| {
            let router = Arc::clone(&router);
            async move { router.image_export(vars, req).await }
        });

        let router = Arc::clone(self);
        mux.get(r"/images/get", move |vars, req| {
            let router = Arc::clone(&router);
            async move { router.image_export(vars, req).await }
        });

        let router = Arc::clone(self);
        mux.get(r"/images/(?P<name>.+)/history", move |vars, req| {
            let router = Arc::clone(&router);
            async move { router.image_history(vars, req).await }
        });
    }

    /// `GET /images/{name}/json`: the inspect record, rebuilt from the
    /// tarball on every request.
    async fn image_inspect(&self, vars: Vars, _req: Request<Body>) -> Result<Response, ApiError> {
        let name = &vars["name"];
        let Some(artifact) = self.store.resolve(name) else {
            return Err(ApiError::not_found(format!("unknown image: {name}")));
        };

        let image = load_image(artifact).await?;
        json_response(&inspect(&image))
    }

    /// `GET /images/{name}/get` and `GET /images/get?names=`: the raw
    /// tarball, streamed chunk by chunk so slow readers see partial content.
    async fn image_export(&self, vars: Vars, req: Request<Body>) -> Result<Response, ApiError> {
        let names = export_names(&vars, &req)?;
        let name = &names[0];

        let Some(artifact) = self.store.resolve(name) else {
            return Err(ApiError::not_found(format!("unknown image: {name}")));
        };
        let path = artifact.source_path().to_path_buf();

        let reader = open_export(path.clone()).await?;
        debug!(image = %name, path = %path.display(), "Exporting image tarball");

        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(8);
        tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let mut buf = vec![0u8; EXPORT_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        // The receiver hanging up means the client went away;
                        // stop reading and release the file handle.
                        if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx.blocking_send(Err(err));
                        break;
                    }
                }
            }
        });

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/x-tar")
            .body(Body::from_stream(ReceiverStream::new(rx)))
            .unwrap_or_default())
    }

    /// `GET /images/{name}/history`: per-step history with computed layer
    /// sizes.
    async fn image_history(&self, vars: Vars, _req: Request<Body>) -> Result<Response, ApiError> {
        let name = &vars["name"];
        let Some(artifact) = self.store.resolve(name) else {
            return Err(ApiError::not_found(format!("unknown image: {name}")));
        };

        let image = load_image(artifact).await?;
        let items = tokio::task::spawn_blocking(move || history(&image))
            .await
            .map_err(|err| ApiError::unavailable(format!("history task failed: {err}")))?
            .map_err(ApiError::from)?;
        json_response(&items)
    }
}

/// The single image name of an export request, from the path or the
/// `names` query parameter. Exactly one is required.
fn export_names(vars: &Vars, req: &Request<Body>) -> Result<Vec<String>, ApiError> {
    let names: Vec<String> = if let Some(name) = vars.get("name") {
        vec![name.clone()]
    } else {
        let query = req.uri().query().unwrap_or_default();
        url::form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| key == "names")
            .map(|(_, value)| value.into_owned())
            .collect()
    };

    if names.is_empty() {
        return Err(ApiError::invalid_parameter(
            "'name' or 'names' must be specified",
        ));
    }
    if names.len() > 1 {
        return Err(ApiError::invalid_parameter("multiple images not supported"));
    }
    Ok(names)
}

/// Open the backing tarball for export; an unopenable file means the image
/// is effectively absent.
async fn open_export(path: PathBuf) -> Result<Box<dyn Read + Send>, ApiError> {
    tokio::task::spawn_blocking(move || {
        archive::open(&path)
            .map_err(|err| ApiError::not_found(format!("unknown image ({}): {err}", path.display())))
    })
    .await
    .map_err(|err| ApiError::unavailable(format!("export task failed: {err}")))?
}
