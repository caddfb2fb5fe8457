//! The reference-to-artifact mapping shared by the protocol routers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::tarball::TarballImage;
use crate::ImageError;

/// What a reference resolves to: a tarball on disk, loaded lazily on each
/// request, or an image handle loaded ahead of time by the caller.
#[derive(Debug, Clone)]
pub enum BackingArtifact {
    Path(PathBuf),
    Image(Arc<TarballImage>),
}

impl BackingArtifact {
    /// Materialize the image. Path-backed artifacts are re-parsed on every
    /// call; nothing is cached between requests.
    pub fn load(&self) -> Result<Arc<TarballImage>, ImageError> {
        match self {
            Self::Path(path) => TarballImage::from_path(path).map(Arc::new),
            Self::Image(image) => Ok(Arc::clone(image)),
        }
    }

    /// Path of the backing tarball, for raw-export responses.
    pub fn source_path(&self) -> &Path {
        match self {
            Self::Path(path) => path,
            Self::Image(image) => image.source_path(),
        }
    }
}

impl From<PathBuf> for BackingArtifact {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for BackingArtifact {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<TarballImage> for BackingArtifact {
    fn from(image: TarballImage) -> Self {
        Self::Image(Arc::new(image))
    }
}

/// An immutable mapping from reference strings to backing artifacts.
///
/// Built once at server construction; `resolve` is a single exact-match
/// lookup with no fuzzy fallback. Blob lookups that only know a repository
/// name use [`ImageStore::resolve_by_prefix`] to scan candidates; iteration
/// order is whatever the map yields and callers must not depend on it.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    entries: HashMap<String, BackingArtifact>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, artifact: impl Into<BackingArtifact>) {
        self.entries.insert(reference.into(), artifact.into());
    }

    /// Build a store from a reference → tarball path mapping.
    pub fn from_paths<I, S, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        let entries = paths
            .into_iter()
            .map(|(reference, path)| (reference.into(), BackingArtifact::Path(path.into())))
            .collect();
        Self { entries }
    }

    /// Exact-match lookup; a key miss is always a miss.
    pub fn resolve(&self, reference: &str) -> Option<&BackingArtifact> {
        self.entries.get(reference)
    }

    /// All artifacts whose reference starts with `prefix`, in unspecified
    /// order.
    pub fn resolve_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a BackingArtifact> {
        self.entries
            .iter()
            .filter(move |(reference, _)| reference.starts_with(prefix))
            .map(|(_, artifact)| artifact)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
