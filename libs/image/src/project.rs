//! Engine-shaped projections of a tarball image.
//!
//! These mirror the Docker Engine API response shapes for image inspect and
//! history. Fields the tarball format cannot supply (sizes, graph driver,
//! repo digests, parent) are explicit zero/empty sentinels, never guessed.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::schema::RunConfig;
use crate::tarball::TarballImage;
use crate::ImageError;

/// An image inspect response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInspect {
    /// The config digest doubles as the image ID.
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "RepoTags")]
    pub repo_tags: Vec<String>,

    #[serde(rename = "RepoDigests")]
    pub repo_digests: Option<Vec<String>>,

    #[serde(rename = "Parent")]
    pub parent: String,

    #[serde(rename = "Comment")]
    pub comment: String,

    #[serde(rename = "Created")]
    pub created: String,

    #[serde(rename = "Container")]
    pub container: String,

    #[serde(rename = "ContainerConfig")]
    pub container_config: RunConfig,

    #[serde(rename = "DockerVersion")]
    pub docker_version: String,

    #[serde(rename = "Author")]
    pub author: String,

    #[serde(rename = "Config")]
    pub config: RunConfig,

    #[serde(rename = "Architecture")]
    pub architecture: String,

    #[serde(rename = "Os")]
    pub os: String,

    #[serde(rename = "OsVersion", default, skip_serializing_if = "String::is_empty")]
    pub os_version: String,

    #[serde(rename = "Size")]
    pub size: i64,

    #[serde(rename = "VirtualSize")]
    pub virtual_size: i64,

    #[serde(rename = "GraphDriver")]
    pub graph_driver: GraphDriverData,

    #[serde(rename = "RootFS")]
    pub root_fs: RootFsInspect,

    #[serde(rename = "Metadata")]
    pub metadata: ImageMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDriverData {
    #[serde(rename = "Data")]
    pub data: Option<std::collections::BTreeMap<String, String>>,

    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootFsInspect {
    #[serde(rename = "Type")]
    pub kind: String,

    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(rename = "LastTagTime", default, skip_serializing_if = "Option::is_none")]
    pub last_tag_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// One image history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponseItem {
    #[serde(rename = "Comment")]
    pub comment: String,

    /// Unix seconds.
    #[serde(rename = "Created")]
    pub created: i64,

    #[serde(rename = "CreatedBy")]
    pub created_by: String,

    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Size")]
    pub size: i64,

    #[serde(rename = "Tags")]
    pub tags: Option<Vec<String>>,
}

/// Build the inspect record for an image.
pub fn inspect(image: &TarballImage) -> ImageInspect {
    let config = image.config_file();
    ImageInspect {
        id: image.config_digest().to_string(),
        repo_tags: image.repo_tags().to_vec(),
        repo_digests: None,
        parent: String::new(),
        comment: String::new(),
        created: config
            .created
            .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .unwrap_or_default(),
        container: config.container.clone(),
        container_config: config.config.clone(),
        docker_version: config.docker_version.clone(),
        author: config.author.clone(),
        config: config.config.clone(),
        architecture: config.architecture.clone(),
        os: config.os.clone(),
        os_version: config.os_version.clone(),
        size: 0,
        virtual_size: 0,
        graph_driver: GraphDriverData::default(),
        root_fs: RootFsInspect {
            kind: config.rootfs.kind.clone(),
            layers: config.rootfs.diff_ids.clone(),
        },
        metadata: ImageMetadata::default(),
    }
}

/// Build the history list for an image.
///
/// Walks config history in order, consuming one computed layer size per
/// non-empty entry; empty-layer entries always get size 0. The number of
/// non-empty entries must equal the number of layers.
pub fn history(image: &TarballImage) -> Result<Vec<HistoryResponseItem>, ImageError> {
    let layer_sizes = image.layer_uncompressed_sizes()?;
    let config = image.config_file();

    let non_empty = config.history.iter().filter(|h| !h.empty_layer).count();
    if non_empty != layer_sizes.len() {
        return Err(ImageError::LayerCountMismatch {
            expected: non_empty,
            actual: layer_sizes.len(),
        });
    }

    let mut items = Vec::with_capacity(config.history.len());
    let mut layer_index = 0;
    for step in &config.history {
        let size = if step.empty_layer {
            0
        } else {
            let size = layer_sizes[layer_index] as i64;
            layer_index += 1;
            size
        };
        items.push(HistoryResponseItem {
            comment: step.comment.clone(),
            created: step.created.map(|t| t.timestamp()).unwrap_or_default(),
            created_by: step.created_by.clone(),
            id: String::new(),
            size,
            tags: None,
        });
    }
    Ok(items)
}
