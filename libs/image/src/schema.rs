//! Serde models for the formats stored inside an image tarball.
//!
//! Field names follow the on-disk JSON exactly: the top-level
//! `manifest.json` uses Go-style exported names (`Config`, `RepoTags`,
//! `Layers`), the image config file uses lowercase keys (`architecture`,
//! `rootfs`, `os.version`), and the embedded run config uses Docker API
//! casing (`Entrypoint`, `ExposedPorts`). Everything defaults, since real
//! tarballs omit most of it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a tarball's top-level `manifest.json` array.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TarManifestEntry {
    /// Member name of the image config file, e.g. `<hex>.json`.
    #[serde(rename = "Config")]
    pub config: String,

    /// Tags the image was saved under; `null` for digest-only saves.
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Option<Vec<String>>,

    /// Member names of the layer blobs, in diff order.
    #[serde(rename = "Layers", default)]
    pub layers: Vec<String>,
}

/// An image config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub architecture: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryItem>,

    #[serde(default)]
    pub os: String,

    #[serde(rename = "os.version", default, skip_serializing_if = "String::is_empty")]
    pub os_version: String,

    #[serde(default)]
    pub rootfs: RootFs,

    #[serde(default)]
    pub config: RunConfig,
}

/// One build step in a config's history.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HistoryItem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,

    /// Marks a step that produced no filesystem layer.
    #[serde(default, skip_serializing_if = "is_false")]
    pub empty_layer: bool,
}

/// The root filesystem section of a config: diff IDs in apply order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RootFs {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub diff_ids: Vec<String>,
}

/// The run configuration embedded in an image config, with Docker API
/// field casing. Carried through to inspect responses verbatim.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(rename = "Hostname", default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    #[serde(rename = "Domainname", default, skip_serializing_if = "String::is_empty")]
    pub domainname: String,

    #[serde(rename = "User", default, skip_serializing_if = "String::is_empty")]
    pub user: String,

    #[serde(rename = "AttachStdin", default, skip_serializing_if = "is_false")]
    pub attach_stdin: bool,

    #[serde(rename = "AttachStdout", default, skip_serializing_if = "is_false")]
    pub attach_stdout: bool,

    #[serde(rename = "AttachStderr", default, skip_serializing_if = "is_false")]
    pub attach_stderr: bool,

    /// Port specs (`"8080/tcp"`) mapped to empty objects.
    #[serde(rename = "ExposedPorts", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, EmptyObject>,

    #[serde(rename = "Tty", default, skip_serializing_if = "is_false")]
    pub tty: bool,

    #[serde(rename = "OpenStdin", default, skip_serializing_if = "is_false")]
    pub open_stdin: bool,

    #[serde(rename = "StdinOnce", default, skip_serializing_if = "is_false")]
    pub stdin_once: bool,

    #[serde(rename = "Env", default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    #[serde(rename = "Cmd", default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,

    #[serde(rename = "Healthcheck", default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthConfig>,

    #[serde(rename = "ArgsEscaped", default, skip_serializing_if = "is_false")]
    pub args_escaped: bool,

    #[serde(rename = "Image", default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    #[serde(rename = "Volumes", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, EmptyObject>,

    #[serde(rename = "WorkingDir", default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,

    #[serde(rename = "Entrypoint", default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,

    #[serde(rename = "NetworkDisabled", default, skip_serializing_if = "is_false")]
    pub network_disabled: bool,

    #[serde(rename = "MacAddress", default, skip_serializing_if = "String::is_empty")]
    pub mac_address: String,

    #[serde(rename = "OnBuild", default, skip_serializing_if = "Vec::is_empty")]
    pub on_build: Vec<String>,

    #[serde(rename = "Labels", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(rename = "StopSignal", default, skip_serializing_if = "String::is_empty")]
    pub stop_signal: String,

    #[serde(rename = "Shell", default, skip_serializing_if = "Vec::is_empty")]
    pub shell: Vec<String>,
}

/// A container healthcheck; durations are nanoseconds, as on the wire.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(rename = "Test", default, skip_serializing_if = "Vec::is_empty")]
    pub test: Vec<String>,

    #[serde(rename = "Interval", default)]
    pub interval: i64,

    #[serde(rename = "Timeout", default)]
    pub timeout: i64,

    #[serde(rename = "StartPeriod", default)]
    pub start_period: i64,

    #[serde(rename = "Retries", default)]
    pub retries: i32,
}

/// Serializes as `{}`; the value type of port and volume sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmptyObject {}

fn is_false(v: &bool) -> bool {
    !*v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_entry_tolerates_null_repo_tags() {
        let entry: TarManifestEntry = serde_json::from_str(
            r#"{"Config":"abc.json","RepoTags":null,"Layers":["l/layer.tar"]}"#,
        )
        .unwrap();
        assert!(entry.repo_tags.is_none());
        assert_eq!(entry.layers, vec!["l/layer.tar"]);
    }

    #[test]
    fn config_file_parses_docker_keys() {
        let config: ConfigFile = serde_json::from_str(
            r#"{
                "architecture": "amd64",
                "created": "2020-03-23T21:19:34.196162891Z",
                "history": [
                    {"created_by": "/bin/sh -c #(nop) ADD file:abc in /"},
                    {"created_by": "/bin/sh -c #(nop) CMD [\"sh\"]", "empty_layer": true}
                ],
                "os": "linux",
                "os.version": "10.0.17763.1040",
                "rootfs": {"type": "layers", "diff_ids": ["sha256:beee9f30"]},
                "config": {
                    "Env": ["PATH=/usr/local/bin"],
                    "Entrypoint": ["/docker-entrypoint.sh"],
                    "ExposedPorts": {"80/tcp": {}},
                    "Labels": {"maintainer": "nobody"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.os_version, "10.0.17763.1040");
        assert_eq!(config.rootfs.kind, "layers");
        assert!(config.history[1].empty_layer);
        assert!(config.config.exposed_ports.contains_key("80/tcp"));
        assert_eq!(config.config.entrypoint, vec!["/docker-entrypoint.sh"]);
    }
}
