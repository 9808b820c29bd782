//! Delivery backend tests.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::put,
};
use clip_thumbnailer::{
    BackendKind, BunnyConfig, BunnyDelivery, Delivery, DeliveryConfig, DeliveryKey, ErrorKind,
    LocalDelivery, OutputFormat, S3Config, S3Delivery, ThumbnailError,
};
use tokio::net::TcpListener;

fn key(prefix: &str, stem: &str) -> DeliveryKey {
    DeliveryKey::with_stem(Some(prefix), stem, OutputFormat::Jpeg).expect("valid key")
}

/// One `PUT` seen by the storage stub.
#[derive(Debug, Clone)]
struct Upload {
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

struct StorageStub {
    status: StatusCode,
    response_body: &'static str,
    uploads: Mutex<Vec<Upload>>,
}

async fn record_put(
    State(stub): State<Arc<StorageStub>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    stub.uploads.lock().expect("lock").push(Upload { path, headers, body });
    (stub.status, stub.response_body)
}

async fn spawn_storage(status: StatusCode, response_body: &'static str) -> (SocketAddr, Arc<StorageStub>) {
    let stub = Arc::new(StorageStub {
        status,
        response_body,
        uploads: Mutex::new(Vec::new()),
    });
    let router = Router::new()
        .route("/*path", put(record_put))
        .with_state(Arc::clone(&stub));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    let address = listener.local_addr().expect("bound address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub runs");
    });
    (address, stub)
}

fn header<'a>(upload: &'a Upload, name: &str) -> Option<&'a str> {
    upload.headers.get(name).and_then(|value| value.to_str().ok())
}

// ── Local ──────────────────────────────────────────────────────────

#[tokio::test]
async fn local_delivery_writes_under_the_root() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let delivery = LocalDelivery::new(root.path());
    let key = key("thumbnails/2026", "frame");

    let reference = delivery
        .store(vec![0xFF, 0xD8, 0xFF, 0xD9], &key)
        .await
        .expect("Failed to store");

    let path = root.path().join("thumbnails").join("2026").join("frame.jpg");
    assert_eq!(delivery.path_for(&key), path);
    assert_eq!(std::fs::read(&path).expect("file written"), vec![0xFF, 0xD8, 0xFF, 0xD9]);
    assert!(reference.ends_with("thumbnails/2026/frame.jpg"), "{reference}");
    assert_eq!(delivery.name(), "local");
}

#[tokio::test]
async fn local_delivery_replaces_and_leaves_no_staging_files() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let delivery = LocalDelivery::new(root.path());
    let key = key("out", "same");

    delivery.store(b"first".to_vec(), &key).await.expect("Failed to store");
    delivery.store(b"second".to_vec(), &key).await.expect("Failed to store");

    let directory = root.path().join("out");
    let entries: Vec<_> = std::fs::read_dir(&directory)
        .expect("directory exists")
        .map(|entry| entry.expect("entry").file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("same.jpg")]);
    assert_eq!(std::fs::read(directory.join("same.jpg")).expect("file"), b"second");
}

#[tokio::test]
async fn unwritable_root_is_a_delivery_error() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let blocker = root.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").expect("Failed to write");
    let delivery = LocalDelivery::new(&blocker);

    let error = delivery
        .store(vec![1, 2, 3], &key("nested", "x"))
        .await
        .expect_err("root is a file");
    assert_eq!(error.kind(), ErrorKind::Delivery);
}

// ── Bunny ──────────────────────────────────────────────────────────

#[test]
fn bunny_storage_and_public_urls() {
    let config = BunnyConfig::new("zone", "secret");
    let key = key("thumbnails", "abc");

    assert_eq!(
        config.storage_url(&key),
        "https://storage.bunnycdn.com/zone/thumbnails/abc.jpg"
    );
    assert_eq!(config.public_url(&key), config.storage_url(&key));

    let regional = config
        .with_region_host("ny.storage.bunnycdn.com/")
        .with_cdn_base_url("https://cdn.example.com/");
    assert_eq!(
        regional.storage_url(&key),
        "https://ny.storage.bunnycdn.com/zone/thumbnails/abc.jpg"
    );
    assert_eq!(regional.public_url(&key), "https://cdn.example.com/thumbnails/abc.jpg");
}

#[test]
fn bunny_host_with_scheme_is_kept() {
    let config = BunnyConfig::new("zone", "secret").with_region_host("http://127.0.0.1:9000");
    assert_eq!(
        config.storage_url(&key("a", "b")),
        "http://127.0.0.1:9000/zone/a/b.jpg"
    );
}

#[test]
fn bunny_debug_hides_the_access_key() {
    let rendered = format!("{:?}", BunnyConfig::new("zone", "hunter2"));
    assert!(rendered.contains("zone"));
    assert!(!rendered.contains("hunter2"));
}

#[test]
fn bunny_needs_credentials() {
    for (zone, access_key) in [("", "secret"), ("zone", "  ")] {
        let result = BunnyDelivery::new(BunnyConfig::new(zone, access_key));
        assert!(matches!(result, Err(ThumbnailError::Configuration(_))));
    }
}

#[tokio::test]
async fn bunny_upload_puts_with_the_access_key() {
    let (address, stub) = spawn_storage(StatusCode::CREATED, "").await;
    let config = BunnyConfig::new("zone", "secret").with_region_host(format!("http://{address}"));
    let delivery = BunnyDelivery::new(config).expect("credentials present");

    let reference = delivery
        .store(vec![0xFF, 0xD8, 0xFF, 0xD9], &key("thumbnails", "abc"))
        .await
        .expect("Failed to upload");

    assert_eq!(reference, format!("http://{address}/zone/thumbnails/abc.jpg"));
    let uploads = stub.uploads.lock().expect("lock").clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].path, "zone/thumbnails/abc.jpg");
    assert_eq!(header(&uploads[0], "accesskey"), Some("secret"));
    assert_eq!(header(&uploads[0], "content-type"), Some("image/jpeg"));
    assert_eq!(&uploads[0].body[..], [0xFF, 0xD8, 0xFF, 0xD9]);
}

#[tokio::test]
async fn bunny_upload_answers_with_the_cdn_url() {
    let (address, _stub) = spawn_storage(StatusCode::OK, "").await;
    let config = BunnyConfig::new("zone", "secret")
        .with_region_host(format!("http://{address}"))
        .with_cdn_base_url("https://cdn.example.com");
    let delivery = BunnyDelivery::new(config).expect("credentials present");

    let reference = delivery
        .store(vec![1], &key("thumbnails", "abc"))
        .await
        .expect("Failed to upload");
    assert_eq!(reference, "https://cdn.example.com/thumbnails/abc.jpg");
}

#[tokio::test]
async fn bunny_rejection_is_a_delivery_error() {
    let (address, _stub) = spawn_storage(StatusCode::UNAUTHORIZED, "bad key").await;
    let config = BunnyConfig::new("zone", "wrong").with_region_host(format!("http://{address}"));
    let delivery = BunnyDelivery::new(config).expect("credentials present");

    let error = delivery
        .store(vec![1], &key("thumbnails", "abc"))
        .await
        .expect_err("401");
    assert_eq!(error.kind(), ErrorKind::Delivery);
    let message = error.to_string();
    assert!(message.contains("401") && message.contains("bad key"), "{message}");
}

// ── S3 ─────────────────────────────────────────────────────────────

#[test]
fn s3_public_urls() {
    let key = key("thumbnails", "abc");

    let config = S3Config::new("bucket");
    assert_eq!(config.public_url(&key), "https://bucket.s3.amazonaws.com/thumbnails/abc.jpg");

    let compatible = S3Config::new("bucket").with_endpoint_url("http://minio:9000/");
    assert_eq!(compatible.public_url(&key), "http://minio:9000/bucket/thumbnails/abc.jpg");

    let fronted = compatible.with_cdn_base_url("https://cdn.example.com/");
    assert_eq!(fronted.public_url(&key), "https://cdn.example.com/thumbnails/abc.jpg");
}

#[test]
fn s3_debug_hides_the_secret() {
    let rendered = format!("{:?}", S3Config::new("bucket").with_credentials("AKIDEXAMPLE", "hunter2"));
    assert!(rendered.contains("bucket"));
    assert!(!rendered.contains("hunter2"));
}

#[test]
fn s3_needs_a_bucket_and_credentials() {
    let cases = [
        S3Config::new("").with_credentials("id", "secret"),
        S3Config::new("bucket"),
        S3Config::new("bucket").with_credentials("id", " "),
    ];
    for config in cases {
        assert!(matches!(S3Delivery::new(config), Err(ThumbnailError::Configuration(_))));
    }
    let delivery = S3Delivery::new(S3Config::new("bucket").with_credentials("id", "secret"))
        .expect("configured");
    assert_eq!(delivery.name(), "s3");
}

#[tokio::test]
async fn s3_upload_puts_a_public_jpeg_object() {
    let (address, stub) = spawn_storage(StatusCode::OK, "").await;
    let config = S3Config::new("bucket")
        .with_credentials("AKIDEXAMPLE", "secret")
        .with_endpoint_url(format!("http://{address}"));
    let delivery = S3Delivery::new(config).expect("configured");

    let reference = delivery
        .store(vec![0xFF, 0xD8, 0xFF, 0xD9], &key("thumbnails", "abc"))
        .await
        .expect("Failed to upload");

    assert_eq!(reference, format!("http://{address}/bucket/thumbnails/abc.jpg"));
    let uploads = stub.uploads.lock().expect("lock").clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].path, "bucket/thumbnails/abc.jpg");
    assert_eq!(header(&uploads[0], "x-amz-acl"), Some("public-read"));
    assert_eq!(header(&uploads[0], "content-type"), Some("image/jpeg"));
    assert!(header(&uploads[0], "authorization").is_some_and(|value| value.starts_with("AWS4-HMAC-SHA256")));
}

#[tokio::test]
async fn s3_rejection_is_a_delivery_error() {
    let (address, _stub) = spawn_storage(
        StatusCode::FORBIDDEN,
        "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
    )
    .await;
    let config = S3Config::new("bucket")
        .with_credentials("AKIDEXAMPLE", "secret")
        .with_endpoint_url(format!("http://{address}"));
    let delivery = S3Delivery::new(config).expect("configured");

    let error = delivery
        .store(vec![1], &key("thumbnails", "abc"))
        .await
        .expect_err("403");
    assert_eq!(error.kind(), ErrorKind::Delivery);
}

// ── Selection ──────────────────────────────────────────────────────

#[test]
fn backend_kind_parsing() {
    assert_eq!("".parse::<BackendKind>().expect("empty"), BackendKind::Auto);
    assert_eq!("AUTO".parse::<BackendKind>().expect("auto"), BackendKind::Auto);
    assert_eq!(" local ".parse::<BackendKind>().expect("local"), BackendKind::Local);
    assert_eq!("bunny".parse::<BackendKind>().expect("bunny"), BackendKind::Bunny);
    assert_eq!("S3".parse::<BackendKind>().expect("s3"), BackendKind::S3);
    assert!("gcs".parse::<BackendKind>().is_err());
}

#[test]
fn auto_selects_local_without_credentials() {
    let delivery = DeliveryConfig::new().build().expect("local fallback");
    assert_eq!(delivery.name(), "local");

    let blank = DeliveryConfig::new()
        .with_bunny(BunnyConfig::new("", ""))
        .build()
        .expect("local fallback");
    assert_eq!(blank.name(), "local");
}

#[test]
fn auto_selects_bunny_with_credentials() {
    let delivery = DeliveryConfig::new()
        .with_bunny(BunnyConfig::new("zone", "secret"))
        .build()
        .expect("bunny");
    assert_eq!(delivery.name(), "bunny");
}

#[test]
fn forced_local_ignores_credentials() {
    let delivery = DeliveryConfig::new()
        .with_backend(BackendKind::Local)
        .with_bunny(BunnyConfig::new("zone", "secret"))
        .build()
        .expect("local");
    assert_eq!(delivery.name(), "local");
}

#[test]
fn forced_bunny_without_credentials_fails() {
    let result = DeliveryConfig::new().with_backend(BackendKind::Bunny).build();
    assert!(matches!(result, Err(ThumbnailError::Configuration(_))));
}

#[test]
fn auto_prefers_bunny_then_s3_then_local() {
    let s3 = S3Config::new("bucket").with_credentials("id", "secret");

    let both = DeliveryConfig::new()
        .with_bunny(BunnyConfig::new("zone", "secret"))
        .with_s3(s3.clone());
    assert_eq!(both.resolved_backend(), BackendKind::Bunny);
    assert_eq!(both.build().expect("bunny").name(), "bunny");

    let only_s3 = DeliveryConfig::new().with_s3(s3.clone());
    assert_eq!(only_s3.resolved_backend(), BackendKind::S3);
    assert_eq!(only_s3.build().expect("s3").name(), "s3");

    let blank_bucket = DeliveryConfig::new().with_s3(S3Config::new(" "));
    assert_eq!(blank_bucket.resolved_backend(), BackendKind::Local);

    let forced_local = DeliveryConfig::new().with_backend(BackendKind::Local).with_s3(s3);
    assert_eq!(forced_local.build().expect("local").name(), "local");
}

#[test]
fn forced_s3_without_settings_fails() {
    let result = DeliveryConfig::new().with_backend(BackendKind::S3).build();
    assert!(matches!(result, Err(ThumbnailError::Configuration(_))));

    let no_credentials = DeliveryConfig::new()
        .with_backend(BackendKind::S3)
        .with_s3(S3Config::new("bucket"))
        .build();
    assert!(matches!(no_credentials, Err(ThumbnailError::Configuration(_))));
}
