//! A single image loaded from a tarball.

use std::path::{Path, PathBuf};

use tracing::debug;

use mobymock_archive as archive;

use crate::manifest::{
    Descriptor, Digest, ImageManifest, CONFIG_MEDIA_TYPE, LAYER_GZIP_MEDIA_TYPE,
    LAYER_TAR_MEDIA_TYPE, MANIFEST_V2_MEDIA_TYPE,
};
use crate::schema::{ConfigFile, TarManifestEntry};
use crate::ImageError;

/// A layer blob exactly as stored in the tarball.
///
/// Digest and size are computed over the stored bytes, which is also what
/// the blob endpoint serves; no re-compression happens anywhere.
#[derive(Debug, Clone)]
pub struct LayerBlob {
    pub digest: Digest,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// An image parsed out of a `docker save`-style tarball.
///
/// Construction enforces the single-image constraint: the tarball's
/// `manifest.json` must describe exactly one image.
#[derive(Debug, Clone)]
pub struct TarballImage {
    source: PathBuf,
    repo_tags: Vec<String>,
    raw_config: Vec<u8>,
    config: ConfigFile,
    manifest: ImageManifest,
    layers: Vec<LayerBlob>,
}

impl TarballImage {
    /// Load the image described by the tarball at `path`.
    ///
    /// The tar stream is forward-only, so each member is pulled with its own
    /// scan; the file descriptor of every scan is released before the next
    /// one opens.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let manifest_json = extract(path, "manifest.json")?;
        let mut entries: Vec<TarManifestEntry> = serde_json::from_slice(&manifest_json)?;
        if entries.len() != 1 {
            return Err(ImageError::NotSingleImage(entries.len()));
        }
        let entry = entries.remove(0);

        let raw_config = extract(path, &entry.config)?;
        let config: ConfigFile = serde_json::from_slice(&raw_config)?;

        let mut layers = Vec::with_capacity(entry.layers.len());
        for member in &entry.layers {
            let bytes = extract(path, member)?;
            let media_type = if archive::is_gzipped(&bytes) {
                LAYER_GZIP_MEDIA_TYPE
            } else {
                LAYER_TAR_MEDIA_TYPE
            };
            layers.push(LayerBlob {
                digest: Digest::of(&bytes),
                media_type: media_type.to_string(),
                bytes,
            });
        }

        let manifest = ImageManifest {
            schema_version: 2,
            media_type: MANIFEST_V2_MEDIA_TYPE.to_string(),
            config: Descriptor {
                media_type: CONFIG_MEDIA_TYPE.to_string(),
                size: raw_config.len() as u64,
                digest: Digest::of(&raw_config),
            },
            layers: layers
                .iter()
                .map(|layer| Descriptor {
                    media_type: layer.media_type.clone(),
                    size: layer.bytes.len() as u64,
                    digest: layer.digest.clone(),
                })
                .collect(),
        };

        debug!(
            path = %path.display(),
            config_digest = %manifest.config.digest,
            layer_count = layers.len(),
            "Loaded image tarball"
        );

        Ok(Self {
            source: path.to_path_buf(),
            repo_tags: entry.repo_tags.unwrap_or_default(),
            raw_config,
            config,
            manifest,
            layers,
        })
    }

    /// Path of the backing tarball.
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    pub fn repo_tags(&self) -> &[String] {
        &self.repo_tags
    }

    /// The recomputed distribution manifest.
    pub fn manifest(&self) -> &ImageManifest {
        &self.manifest
    }

    pub fn media_type(&self) -> &str {
        &self.manifest.media_type
    }

    /// Raw config file bytes; hashes to [`Self::config_digest`].
    pub fn raw_config(&self) -> &[u8] {
        &self.raw_config
    }

    pub fn config_file(&self) -> &ConfigFile {
        &self.config
    }

    pub fn config_digest(&self) -> &Digest {
        &self.manifest.config.digest
    }

    pub fn layers(&self) -> &[LayerBlob] {
        &self.layers
    }

    pub fn layer_by_digest(&self, digest: &Digest) -> Option<&LayerBlob> {
        self.layers.iter().find(|layer| &layer.digest == digest)
    }

    /// Per-layer uncompressed sizes, in manifest order.
    ///
    /// Sums the declared entry sizes of each layer tar (gunzipping stored
    /// blobs as needed). Known to disagree with Docker's own accounting for
    /// some images; served as a best-effort figure.
    pub fn layer_uncompressed_sizes(&self) -> Result<Vec<u64>, ImageError> {
        self.layers
            .iter()
            .map(|layer| {
                archive::uncompressed_size(archive::blob_reader(&layer.bytes)).map_err(|source| {
                    ImageError::LayerSize {
                        digest: layer.digest.clone(),
                        source,
                    }
                })
            })
            .collect()
    }
}

fn extract(path: &Path, member: &str) -> Result<Vec<u8>, ImageError> {
    let reader = archive::open(path).map_err(|source| ImageError::OpenSource {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(archive::extract_file(reader, member)?)
}

#[cfg(test)]
mod tests {
    use mobymock_testing::ImageFixture;
    use sha2::{Digest as _, Sha256};

    use super::*;

    #[test]
    fn from_path_computes_consistent_digests() {
        let fixture = ImageFixture::builder("test/consistent:1")
            .layer(&[("etc/hostname", b"box")])
            .build();
        let image = TarballImage::from_path(fixture.tar_path()).unwrap();

        // Config descriptor hashes the raw config bytes.
        let config_digest = format!("sha256:{}", hex::encode(Sha256::digest(image.raw_config())));
        assert_eq!(image.config_digest().as_str(), config_digest);
        assert_eq!(
            image.manifest().config.size as usize,
            image.raw_config().len()
        );

        // Layer descriptors hash the stored blob bytes.
        let layer = &image.layers()[0];
        assert_eq!(
            layer.digest.as_str(),
            format!("sha256:{}", hex::encode(Sha256::digest(&layer.bytes)))
        );
        assert_eq!(layer.digest.as_str(), fixture.layer_digests()[0]);
    }

    #[test]
    fn from_path_rejects_multi_image_tarballs() {
        let fixture = ImageFixture::builder("test/multi:1")
            .layer(&[("a", b"a")])
            .duplicate_manifest_entries(2)
            .build();
        let err = TarballImage::from_path(fixture.tar_path()).unwrap_err();
        assert!(matches!(err, ImageError::NotSingleImage(2)));
    }

    #[test]
    fn from_path_surfaces_missing_file() {
        let err = TarballImage::from_path("does/not/exist.tar").unwrap_err();
        assert!(matches!(err, ImageError::OpenSource { .. }));
    }

    #[test]
    fn gzipped_tarball_and_layers_load() {
        let fixture = ImageFixture::builder("test/gz:1")
            .layer(&[("bin/sh", b"#!")])
            .gzip_layers(true)
            .gzip_tarball(true)
            .build();
        let image = TarballImage::from_path(fixture.tar_path()).unwrap();
        assert_eq!(image.layers()[0].media_type, LAYER_GZIP_MEDIA_TYPE);
        assert!(mobymock_archive::is_gzipped(&image.layers()[0].bytes));
    }

    #[test]
    fn uncompressed_sizes_sum_layer_entries() {
        let fixture = ImageFixture::builder("test/sizes:1")
            .layer(&[("a", &[0u8; 100]), ("b", &[0u8; 50])])
            .layer(&[("c", &[0u8; 7])])
            .gzip_layers(true)
            .build();
        let image = TarballImage::from_path(fixture.tar_path()).unwrap();
        assert_eq!(image.layer_uncompressed_sizes().unwrap(), vec![150, 7]);
    }

    #[test]
    fn layer_lookup_is_by_exact_digest() {
        let fixture = ImageFixture::builder("test/lookup:1")
            .layer(&[("a", b"one")])
            .layer(&[("b", b"two")])
            .build();
        let image = TarballImage::from_path(fixture.tar_path()).unwrap();

        let second = Digest::parse(&fixture.layer_digests()[1]).unwrap();
        assert!(image.layer_by_digest(&second).is_some());

        let absent = Digest::of(b"not a layer");
        assert!(image.layer_by_digest(&absent).is_none());
    }
}
