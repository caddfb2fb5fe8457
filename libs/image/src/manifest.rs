//! Content-addressed manifest types.
//!
//! The manifest served for an image is recomputed from the tarball rather
//! than read from it, so the descriptors here always agree with the blobs
//! the registry endpoints hand out.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::ImageError;

pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";
pub const LAYER_GZIP_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const LAYER_TAR_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar";

/// A `sha256:<hex>` content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub const ALGORITHM: &'static str = "sha256";

    /// Parse a digest string, requiring the `sha256:` prefix and a full
    /// 32-byte hex payload.
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        let Some((algorithm, hex_part)) = s.split_once(':') else {
            return Err(ImageError::InvalidDigest(s.to_string()));
        };
        if algorithm != Self::ALGORITHM
            || hex_part.len() != 64
            || hex::decode(hex_part).is_err()
        {
            return Err(ImageError::InvalidDigest(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The digest of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        Self(format!("{}:{}", Self::ALGORITHM, hex::encode(Sha256::digest(bytes))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A content descriptor: media type, size, digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub size: u64,
    pub digest: Digest,
}

/// A Docker distribution manifest, schema version 2.
///
/// Serialized compactly (no trailing newline) so the bytes hash to a stable
/// digest across endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

impl ImageManifest {
    /// The compact JSON encoding served to registry clients.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        Ok(serde_json::to_vec(self)?)
    }
}
