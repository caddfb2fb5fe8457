//! Configuration for the standalone binary.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// Docker engine and registry emulator backed by image tarballs.
#[derive(Debug, Parser)]
#[command(name = "mobymock", version)]
pub struct Config {
    /// Engine API listen address.
    #[arg(long, env = "MOBYMOCK_ENGINE_ADDR", default_value = "127.0.0.1:2375")]
    pub engine_addr: SocketAddr,

    /// Registry API listen address.
    #[arg(long, env = "MOBYMOCK_REGISTRY_ADDR", default_value = "127.0.0.1:5000")]
    pub registry_addr: SocketAddr,

    /// Optional unix-domain socket the engine API also listens on.
    #[arg(long, env = "MOBYMOCK_ENGINE_SOCKET")]
    pub engine_socket: Option<PathBuf>,

    /// Path to the JSON file mapping references to tarball paths.
    #[arg(long, env = "MOBYMOCK_IMAGES")]
    pub images: PathBuf,

    /// Version string reported by the engine's `/_ping`.
    #[arg(long, env = "MOBYMOCK_API_VERSION", default_value = crate::server::DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Registry username; the bearer gate engages only when user, password
    /// and secret are all set.
    #[arg(long, env = "MOBYMOCK_AUTH_USER", default_value = "")]
    pub auth_user: String,

    /// Registry password.
    #[arg(long, env = "MOBYMOCK_AUTH_PASSWORD", default_value = "")]
    pub auth_password: String,

    /// Token signing secret.
    #[arg(long, env = "MOBYMOCK_AUTH_SECRET", default_value = "")]
    pub auth_secret: String,

    /// Log level when RUST_LOG is unset.
    #[arg(long, env = "MOBYMOCK_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// The on-disk image mapping: engine names and registry references, each to
/// a tarball path.
#[derive(Debug, Default, Deserialize)]
pub struct ImagesFile {
    #[serde(default)]
    pub engine: HashMap<String, PathBuf>,

    #[serde(default)]
    pub registry: HashMap<String, PathBuf>,
}

impl ImagesFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read(path)
            .with_context(|| format!("reading image mapping {}", path.display()))?;
        serde_json::from_slice(&contents)
            .with_context(|| format!("parsing image mapping {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_file_parses_both_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("images.json");
        std::fs::write(
            &path,
            r#"{
                "engine": {"index.docker.io/library/alpine:3.11": "testdata/alpine.tar"},
                "registry": {"v2/alpine:ref123": "testdata/alpine.tar"}
            }"#,
        )
        .unwrap();

        let images = ImagesFile::load(&path).unwrap();
        assert_eq!(images.engine.len(), 1);
        assert_eq!(
            images.registry["v2/alpine:ref123"],
            PathBuf::from("testdata/alpine.tar")
        );
    }

    #[test]
    fn images_file_sections_default_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("images.json");
        std::fs::write(&path, "{}").unwrap();
        let images = ImagesFile::load(&path).unwrap();
        assert!(images.engine.is_empty() && images.registry.is_empty());
    }
}
