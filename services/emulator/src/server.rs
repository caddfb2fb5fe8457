//! Server construction and spawning.
//!
//! Mirrors the shape of a test HTTP server: bind (an ephemeral port by
//! default), spawn the accept loop, report the bound address, shut down
//! gracefully on request. The engine can additionally listen on a
//! unix-domain socket for clients that speak to a local daemon.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use mobymock_image::ImageStore;

use crate::api;
use crate::api::auth::Auth;

/// Engine API version reported by `/_ping` when none is configured.
pub const DEFAULT_API_VERSION: &str = "1.45";

fn ephemeral_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Options for the engine server.
#[derive(Debug, Default)]
pub struct EngineOption {
    /// Version string for the `Api-Version` header; defaults to
    /// [`DEFAULT_API_VERSION`].
    pub api_version: Option<String>,
    /// Reference → artifact mapping served by the image routes.
    pub images: ImageStore,
    /// Listen address; an ephemeral localhost port when unset.
    pub listen_addr: Option<SocketAddr>,
    /// Additional unix-domain socket to serve the same API on.
    pub unix_socket: Option<PathBuf>,
}

/// Options for the registry server.
#[derive(Debug, Default)]
pub struct RegistryOption {
    /// Reference → artifact mapping served by manifest and blob routes.
    pub images: ImageStore,
    /// Registry credential; the bearer gate engages only when fully
    /// populated.
    pub auth: Auth,
    /// Listen address; an ephemeral localhost port when unset.
    pub listen_addr: Option<SocketAddr>,
}

/// A running server. Dropping the handle signals shutdown.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// The bound TCP address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:39041`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Signal shutdown and wait for the accept loops to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Spawn the engine server.
pub async fn spawn_engine(opt: EngineOption) -> io::Result<ServerHandle> {
    let api_version = opt
        .api_version
        .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
    let app = api::engine_app(opt.images, api_version);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = TcpListener::bind(opt.listen_addr.unwrap_or_else(ephemeral_addr)).await?;
    let addr = listener.local_addr()?;
    debug!(%addr, "Engine API bound");
    let mut tasks = vec![serve_tcp(listener, app.clone(), shutdown_rx.clone())];

    #[cfg(unix)]
    if let Some(path) = opt.unix_socket {
        let listener = tokio::net::UnixListener::bind(&path)?;
        info!(socket = %path.display(), "Engine API listening on unix socket");
        tasks.push(serve_unix(listener, app, shutdown_rx));
    }

    Ok(ServerHandle {
        addr,
        shutdown: shutdown_tx,
        tasks,
    })
}

/// Spawn the registry server.
pub async fn spawn_registry(opt: RegistryOption) -> io::Result<ServerHandle> {
    let app = api::registry_app(opt.images, opt.auth);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = TcpListener::bind(opt.listen_addr.unwrap_or_else(ephemeral_addr)).await?;
    let addr = listener.local_addr()?;
    debug!(%addr, "Registry API bound");
    let tasks = vec![serve_tcp(listener, app, shutdown_rx)];

    Ok(ServerHandle {
        addr,
        shutdown: shutdown_tx,
        tasks,
    })
}

fn serve_tcp(listener: TcpListener, app: Router, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown))
            .await;
        if let Err(err) = result {
            error!(error = %err, "Server error");
        }
    })
}

#[cfg(unix)]
fn serve_unix(
    listener: tokio::net::UnixListener,
    app: Router,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown))
            .await;
        if let Err(err) = result {
            error!(error = %err, "Unix socket server error");
        }
    })
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
