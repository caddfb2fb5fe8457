//! End-to-end tests for the engine API over real HTTP.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p mobymock-e2e --test engine_api
//! ```

use std::io::Read;

use mobymock_server::{spawn_engine, EngineOption, ImageStore, ServerHandle};
use mobymock_testing::ImageFixture;

const ALPINE: &str = "index.docker.io/library/alpine:3.11";

async fn engine_with(entries: Vec<(String, std::path::PathBuf)>) -> ServerHandle {
    spawn_engine(EngineOption {
        images: ImageStore::from_paths(entries),
        ..Default::default()
    })
    .await
    .expect("spawn engine")
}

fn alpine_fixture() -> ImageFixture {
    ImageFixture::builder(ALPINE)
        .layer(&[("etc/alpine-release", b"3.11.5"), ("bin/sh", &[0u8; 500])])
        .env("PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin")
        .entrypoint(&["/bin/sh"])
        .exposed_port("8080/tcp")
        .label("maintainer", "nobody@example.com")
        .build()
}

#[tokio::test]
async fn ping_reports_configured_api_version() {
    let server = spawn_engine(EngineOption {
        api_version: Some("1.38".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();

    let resp = reqwest::get(format!("{}/_ping", server.url())).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["api-version"].to_str().unwrap(), "1.38");
}

#[tokio::test]
async fn ping_defaults_to_1_45() {
    let server = engine_with(vec![]).await;
    let resp = reqwest::get(format!("{}/_ping", server.url())).await.unwrap();
    assert_eq!(resp.headers()["api-version"].to_str().unwrap(), "1.45");
}

#[tokio::test]
async fn inspect_rebuilds_the_record_from_the_tarball() {
    let fixture = alpine_fixture();
    let server = engine_with(vec![(ALPINE.to_string(), fixture.tar_path().to_path_buf())]).await;

    let resp = reqwest::get(format!("{}/images/{ALPINE}/json", server.url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let inspect: serde_json::Value = resp.json().await.unwrap();

    assert_eq!(inspect["Id"], fixture.config_digest());
    assert_eq!(inspect["RepoTags"][0], ALPINE);
    assert_eq!(inspect["Os"], "linux");
    assert_eq!(inspect["Architecture"], "amd64");
    assert_eq!(inspect["Config"]["Entrypoint"][0], "/bin/sh");
    assert!(inspect["Config"]["ExposedPorts"]["8080/tcp"].is_object());
    assert_eq!(inspect["Config"]["Labels"]["maintainer"], "nobody@example.com");
    assert_eq!(inspect["RootFS"]["Type"], "layers");
    assert_eq!(inspect["RootFS"]["Layers"].as_array().unwrap().len(), 1);

    // Unsupported fields are explicit sentinels.
    assert_eq!(inspect["Size"], 0);
    assert_eq!(inspect["VirtualSize"], 0);
    assert!(inspect["RepoDigests"].is_null());
    assert_eq!(inspect["Parent"], "");
}

#[tokio::test]
async fn inspect_accepts_the_versioned_path_form() {
    let fixture = alpine_fixture();
    let server = engine_with(vec![(ALPINE.to_string(), fixture.tar_path().to_path_buf())]).await;

    let resp = reqwest::get(format!("{}/v1.45/images/{ALPINE}/json", server.url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn unknown_image_is_404_json_for_new_apis_plain_for_old() {
    let server = engine_with(vec![]).await;

    let resp = reqwest::get(format!("{}/images/missing:latest/json", server.url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "unknown image: missing:latest");

    // API 1.22 predates JSON error bodies.
    let resp = reqwest::get(format!("{}/v1.22/images/missing:latest/json", server.url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"), "{content_type}");
    assert_eq!(resp.text().await.unwrap(), "unknown image: missing:latest\n");
}

#[tokio::test]
async fn export_streams_the_raw_tarball() {
    let fixture = alpine_fixture();
    let server = engine_with(vec![(ALPINE.to_string(), fixture.tar_path().to_path_buf())]).await;

    let resp = reqwest::get(format!("{}/images/{ALPINE}/get", server.url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/x-tar"
    );
    let body = resp.bytes().await.unwrap();
    let on_disk = std::fs::read(fixture.tar_path()).unwrap();
    assert_eq!(body.as_ref(), on_disk.as_slice());
}

#[tokio::test]
async fn export_gunzips_compressed_tarballs() {
    let fixture = ImageFixture::builder("alpine:gz")
        .layer(&[("bin/sh", b"#!/bin/sh")])
        .gzip_tarball(true)
        .build();
    let server = engine_with(vec![(
        "alpine:gz".to_string(),
        fixture.tar_path().to_path_buf(),
    )])
    .await;

    let resp = reqwest::get(format!("{}/images/alpine:gz/get", server.url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.bytes().await.unwrap();

    let compressed = std::fs::read(fixture.tar_path()).unwrap();
    let mut expected = Vec::new();
    flate2::read::GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut expected)
        .unwrap();
    assert_eq!(body.as_ref(), expected.as_slice());
}

#[tokio::test]
async fn export_by_query_accepts_exactly_one_name() {
    let fixture = alpine_fixture();
    let server = engine_with(vec![(ALPINE.to_string(), fixture.tar_path().to_path_buf())]).await;
    let client = reqwest::Client::new();

    let encoded = "index.docker.io%2Flibrary%2Falpine%3A3.11";
    let resp = client
        .get(format!("{}/images/get?names={encoded}", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/images/get", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "'name' or 'names' must be specified");

    let resp = client
        .get(format!("{}/images/get?names=a&names=b", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "multiple images not supported");
}

#[tokio::test]
async fn history_attributes_sizes_to_non_empty_steps() {
    let fixture = ImageFixture::builder("alpine:history")
        .layer(&[("a", &[0u8; 64])])
        .layer(&[("b", &[0u8; 32])])
        .history_entry("ADD file:a in /", false)
        .history_entry("CMD [\"/bin/sh\"]", true)
        .history_entry("COPY b /", false)
        .build();
    let server = engine_with(vec![(
        "alpine:history".to_string(),
        fixture.tar_path().to_path_buf(),
    )])
    .await;

    let resp = reqwest::get(format!("{}/images/alpine:history/history", server.url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let items: serde_json::Value = resp.json().await.unwrap();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["Size"], 64);
    assert_eq!(items[1]["Size"], 0);
    assert_eq!(items[2]["Size"], 32);
    assert_eq!(items[1]["CreatedBy"], "CMD [\"/bin/sh\"]");
}

#[tokio::test]
async fn history_with_mismatched_layer_count_is_503() {
    let fixture = ImageFixture::builder("alpine:mismatch")
        .layer(&[("a", b"a")])
        .history_entry("ADD file:a in /", false)
        .history_entry("COPY b /", false)
        .build();
    let server = engine_with(vec![(
        "alpine:mismatch".to_string(),
        fixture.tar_path().to_path_buf(),
    )])
    .await;

    let resp = reqwest::get(format!("{}/images/alpine:mismatch/history", server.url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn multi_image_tarball_fails_inspect_and_history() {
    let fixture = ImageFixture::builder("alpine:multi")
        .layer(&[("a", b"a")])
        .duplicate_manifest_entries(2)
        .build();
    let server = engine_with(vec![(
        "alpine:multi".to_string(),
        fixture.tar_path().to_path_buf(),
    )])
    .await;

    for route in ["json", "history"] {
        let resp = reqwest::get(format!("{}/images/alpine:multi/{route}", server.url()))
            .await
            .unwrap();
        assert_eq!(resp.status(), 503, "{route}");
    }
}
