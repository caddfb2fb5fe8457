//! Image store, tarball image model, and protocol projections.
//!
//! A backing tarball (`docker save` / OCI layout as a single tar, optionally
//! gzipped) is turned into the artifacts the emulated APIs serve: a
//! content-addressed manifest, raw config and layer blobs, an engine-shaped
//! inspect record, and a per-layer history. Nothing is cached: every
//! projection is recomputed from the tarball on each request, so results are
//! deterministic for a given file.

mod manifest;
mod project;
mod schema;
mod store;
mod tarball;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use mobymock_archive::ArchiveError;

pub use manifest::{
    Descriptor, Digest, ImageManifest, CONFIG_MEDIA_TYPE, LAYER_GZIP_MEDIA_TYPE,
    LAYER_TAR_MEDIA_TYPE, MANIFEST_V2_MEDIA_TYPE,
};
pub use project::{
    history, inspect, GraphDriverData, HistoryResponseItem, ImageInspect, ImageMetadata,
    RootFsInspect,
};
pub use schema::{ConfigFile, EmptyObject, HealthConfig, HistoryItem, RootFs, RunConfig, TarManifestEntry};
pub use store::{BackingArtifact, ImageStore};
pub use tarball::{LayerBlob, TarballImage};

/// Errors from loading or projecting a tarball image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The backing file could not be opened at all.
    #[error("unable to open image tarball {path}: {source}")]
    OpenSource { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tarball must contain exactly one image, found {0} manifest entries")]
    NotSingleImage(usize),

    #[error("invalid digest {0:?}")]
    InvalidDigest(String),

    #[error("config history references {expected} layers but the tarball has {actual}")]
    LayerCountMismatch { expected: usize, actual: usize },

    /// Computing a layer's uncompressed size failed; distinct from
    /// [`ImageError::LayerCountMismatch`] so callers can map the two to
    /// different responses.
    #[error("failed computing uncompressed size of layer {digest}")]
    LayerSize {
        digest: Digest,
        #[source]
        source: ArchiveError,
    },
}
