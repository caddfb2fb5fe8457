//! Test-double Docker engine and registry servers.
//!
//! This crate primarily ships the `mobymock` binary, but the library
//! surface lets tests embed the servers directly: build an [`ImageStore`]
//! from tarball paths, spawn with [`spawn_engine`] / [`spawn_registry`] on
//! an ephemeral port, and point the client under test at
//! [`ServerHandle::url`].

pub mod api;
pub mod config;
pub mod mux;
pub mod server;

pub use api::auth::Auth;
pub use mobymock_image::{BackingArtifact, ImageStore};
pub use server::{
    spawn_engine, spawn_registry, EngineOption, RegistryOption, ServerHandle, DEFAULT_API_VERSION,
};
