//! Synthesized image-tarball fixtures.
//!
//! Tests build the tarballs they need instead of checking in binaries: a
//! fixture is a `docker save`-shaped tar (config file, layer blobs,
//! `manifest.json`) written to a temp dir, with every digest and size the
//! emulator is expected to reproduce reported back to the test.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

const DEFAULT_CREATED: &str = "2023-01-01T00:00:00Z";

/// A built fixture. Dropping it removes the backing temp dir.
pub struct ImageFixture {
    _dir: TempDir,
    tar_path: PathBuf,
    config_digest: String,
    layer_digests: Vec<String>,
    layer_uncompressed_sizes: Vec<u64>,
}

impl ImageFixture {
    pub fn builder(repo_tag: &str) -> ImageFixtureBuilder {
        ImageFixtureBuilder {
            repo_tag: repo_tag.to_string(),
            layers: Vec::new(),
            history: Vec::new(),
            env: Vec::new(),
            entrypoint: Vec::new(),
            exposed_ports: Vec::new(),
            labels: Vec::new(),
            gzip_layers: false,
            gzip_tarball: false,
            manifest_copies: 1,
            corrupt_layers: Vec::new(),
        }
    }

    /// Path of the tarball on disk.
    pub fn tar_path(&self) -> &Path {
        &self.tar_path
    }

    /// `sha256:<hex>` digest of the raw config bytes.
    pub fn config_digest(&self) -> &str {
        &self.config_digest
    }

    /// `sha256:<hex>` digests of the stored layer blobs, in order.
    pub fn layer_digests(&self) -> &[String] {
        &self.layer_digests
    }

    /// Sum of declared entry sizes per layer, in order.
    pub fn layer_uncompressed_sizes(&self) -> &[u64] {
        &self.layer_uncompressed_sizes
    }
}

pub struct ImageFixtureBuilder {
    repo_tag: String,
    layers: Vec<Vec<(String, Vec<u8>)>>,
    history: Vec<(String, bool)>,
    env: Vec<String>,
    entrypoint: Vec<String>,
    exposed_ports: Vec<String>,
    labels: Vec<(String, String)>,
    gzip_layers: bool,
    gzip_tarball: bool,
    manifest_copies: usize,
    corrupt_layers: Vec<usize>,
}

impl ImageFixtureBuilder {
    /// Add a layer holding the given files.
    pub fn layer(mut self, files: &[(&str, &[u8])]) -> Self {
        self.layers.push(
            files
                .iter()
                .map(|(name, contents)| (name.to_string(), contents.to_vec()))
                .collect(),
        );
        self
    }

    /// Add an explicit history step. Without any, one non-empty step per
    /// layer is generated.
    pub fn history_entry(mut self, created_by: &str, empty_layer: bool) -> Self {
        self.history.push((created_by.to_string(), empty_layer));
        self
    }

    pub fn env(mut self, var: &str) -> Self {
        self.env.push(var.to_string());
        self
    }

    pub fn entrypoint(mut self, entrypoint: &[&str]) -> Self {
        self.entrypoint = entrypoint.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn exposed_port(mut self, port: &str) -> Self {
        self.exposed_ports.push(port.to_string());
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.push((key.to_string(), value.to_string()));
        self
    }

    /// Store layer blobs gzip-compressed.
    pub fn gzip_layers(mut self, yes: bool) -> Self {
        self.gzip_layers = yes;
        self
    }

    /// Gzip the whole tarball (`.tar.gz` suffix).
    pub fn gzip_tarball(mut self, yes: bool) -> Self {
        self.gzip_tarball = yes;
        self
    }

    /// Repeat the manifest entry, producing an (invalid) multi-image
    /// tarball.
    pub fn duplicate_manifest_entries(mut self, copies: usize) -> Self {
        self.manifest_copies = copies;
        self
    }

    /// Replace the stored bytes of layer `index` with data that is neither
    /// a readable tar nor valid gzip.
    pub fn corrupt_layer(mut self, index: usize) -> Self {
        self.corrupt_layers.push(index);
        self
    }

    pub fn build(self) -> ImageFixture {
        let dir = TempDir::new().expect("create fixture dir");

        // Layer blobs: tar per layer, optionally gzipped, digested as stored.
        let mut stored_layers = Vec::new();
        let mut layer_digests = Vec::new();
        let mut layer_sizes = Vec::new();
        let mut diff_ids = Vec::new();
        for (index, files) in self.layers.iter().enumerate() {
            let tar_bytes = build_tar(files);
            diff_ids.push(sha256_digest(&tar_bytes));
            layer_sizes.push(files.iter().map(|(_, c)| c.len() as u64).sum());

            let mut stored = if self.gzip_layers {
                gzip(&tar_bytes)
            } else {
                tar_bytes
            };
            if self.corrupt_layers.contains(&index) {
                // gzip magic followed by an invalid compression method byte
                stored = vec![0x1f, 0x8b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
            }
            layer_digests.push(sha256_digest(&stored));
            stored_layers.push(stored);
        }

        // Config file referencing the layers.
        let history: Vec<serde_json::Value> = if self.history.is_empty() {
            (0..self.layers.len())
                .map(|i| {
                    json!({
                        "created": DEFAULT_CREATED,
                        "created_by": format!("/bin/sh -c #(nop) ADD layer{i} in /"),
                    })
                })
                .collect()
        } else {
            self.history
                .iter()
                .map(|(created_by, empty)| {
                    let mut step = json!({
                        "created": DEFAULT_CREATED,
                        "created_by": created_by,
                    });
                    if *empty {
                        step["empty_layer"] = json!(true);
                    }
                    step
                })
                .collect()
        };

        let mut run_config = serde_json::Map::new();
        if !self.env.is_empty() {
            run_config.insert("Env".into(), json!(self.env));
        }
        if !self.entrypoint.is_empty() {
            run_config.insert("Entrypoint".into(), json!(self.entrypoint));
        }
        if !self.exposed_ports.is_empty() {
            let ports: BTreeMap<&str, serde_json::Value> = self
                .exposed_ports
                .iter()
                .map(|p| (p.as_str(), json!({})))
                .collect();
            run_config.insert("ExposedPorts".into(), json!(ports));
        }
        if !self.labels.is_empty() {
            let labels: BTreeMap<&str, &str> = self
                .labels
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            run_config.insert("Labels".into(), json!(labels));
        }

        let config = json!({
            "architecture": "amd64",
            "created": DEFAULT_CREATED,
            "docker_version": "24.0.7",
            "history": history,
            "os": "linux",
            "rootfs": {"type": "layers", "diff_ids": diff_ids},
            "config": run_config,
        });
        let config_bytes = serde_json::to_vec(&config).expect("encode fixture config");
        let config_digest = sha256_digest(&config_bytes);
        let config_member = format!("{}.json", &config_digest["sha256:".len()..]);

        let layer_members: Vec<String> = (0..stored_layers.len())
            .map(|i| format!("layer{i}/layer.tar"))
            .collect();

        let manifest_entry = json!({
            "Config": config_member,
            "RepoTags": [self.repo_tag],
            "Layers": layer_members,
        });
        let manifest = json!(vec![manifest_entry; self.manifest_copies.max(1)]);
        let manifest_bytes = serde_json::to_vec(&manifest).expect("encode fixture manifest");

        // Assemble the outer tarball.
        let mut members: Vec<(String, Vec<u8>)> = vec![(config_member.clone(), config_bytes)];
        for (member, bytes) in layer_members.iter().zip(&stored_layers) {
            members.push((member.clone(), bytes.clone()));
        }
        members.push(("manifest.json".to_string(), manifest_bytes));
        let mut tarball = build_tar(&members);

        let file_name = if self.gzip_tarball {
            tarball = gzip(&tarball);
            "image.tar.gz"
        } else {
            "image.tar"
        };
        let tar_path = dir.path().join(file_name);
        std::fs::write(&tar_path, &tarball).expect("write fixture tarball");

        ImageFixture {
            _dir: dir,
            tar_path,
            config_digest,
            layer_digests,
            layer_uncompressed_sizes: layer_sizes,
        }
    }
}

fn build_tar(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_slice())
            .expect("append fixture entry");
    }
    builder.into_inner().expect("finish fixture tar")
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("gzip fixture bytes");
    encoder.finish().expect("finish fixture gzip")
}

fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}
