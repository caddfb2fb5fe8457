//! mobymock: a Docker engine and registry emulator backed by image
//! tarballs on local disk.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mobymock_server::config::{Config, ImagesFile};
use mobymock_server::{
    spawn_engine, spawn_registry, Auth, EngineOption, ImageStore, RegistryOption,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Prefer RUST_LOG, fall back to the configured level.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let images = ImagesFile::load(&config.images)?;
    info!(
        engine_images = images.engine.len(),
        registry_images = images.registry.len(),
        "Image mapping loaded"
    );

    let engine = spawn_engine(EngineOption {
        api_version: Some(config.api_version.clone()),
        images: ImageStore::from_paths(images.engine),
        listen_addr: Some(config.engine_addr),
        unix_socket: config.engine_socket.clone(),
    })
    .await?;
    info!(url = %engine.url(), "Engine API listening");

    let registry = spawn_registry(RegistryOption {
        images: ImageStore::from_paths(images.registry),
        auth: Auth {
            user: config.auth_user.clone(),
            password: config.auth_password.clone(),
            secret: config.auth_secret.clone(),
        },
        listen_addr: Some(config.registry_addr),
    })
    .await?;
    info!(url = %registry.url(), "Registry API listening");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    engine.shutdown().await;
    registry.shutdown().await;
    Ok(())
}
