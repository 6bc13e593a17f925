//! End-to-end tests for the HTTP surface, using a stub encoder so no ONNX
//! model files are needed.

use axum_test::TestServer;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use turnstile_core::encoder::EncoderError;
use turnstile_core::registry::IdentityRecord;
use turnstile_core::{BoundingBox, Encoding, FaceEncoder, FaceIdentifier, Registry};
use turnstiled::engine::spawn_engine;
use turnstiled::http::{router, AppState};

/// Stub encoder: the probe's top-left pixel drives the result — red channel
/// is the face count, green/blue become the encoding.
struct PixelEncoder;

impl FaceEncoder for PixelEncoder {
    fn detect(&mut self, photo: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        let count = photo.get_pixel(0, 0).0[0] as usize;
        Ok((0..count)
            .map(|i| BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 8.0,
                height: 8.0,
                confidence: 0.9 - i as f32 * 0.1,
                landmarks: Some([(0.0, 0.0); 5]),
            })
            .collect())
    }

    fn encode(&mut self, photo: &RgbImage, _face: &BoundingBox) -> Result<Encoding, EncoderError> {
        let p = photo.get_pixel(0, 0).0;
        Ok(Encoding {
            values: vec![p[1] as f32 / 255.0, p[2] as f32 / 255.0],
            model_version: None,
        })
    }
}

fn photo_png_base64(pixel: [u8; 3]) -> String {
    let img = RgbImage::from_pixel(8, 8, Rgb(pixel));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    BASE64.encode(&buf)
}

/// Encoder that dies mid-request, taking the engine thread with it.
struct CrashingEncoder;

impl FaceEncoder for CrashingEncoder {
    fn detect(&mut self, _photo: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        panic!("inference backend gone")
    }

    fn encode(&mut self, _photo: &RgbImage, _face: &BoundingBox) -> Result<Encoding, EncoderError> {
        unreachable!()
    }
}

/// Server over a one-identity registry ("0001", reference pixel [1, 100, 50]).
fn test_server(dir: &Path) -> TestServer {
    test_server_with(Box::new(PixelEncoder), dir)
}

fn test_server_with(encoder: Box<dyn FaceEncoder + Send>, dir: &Path) -> TestServer {
    let ref_path = dir.join("0001.png");
    RgbImage::from_pixel(8, 8, Rgb([1, 100, 50]))
        .save(&ref_path)
        .unwrap();

    let mut entries = HashMap::new();
    entries.insert(
        "0001".to_string(),
        IdentityRecord {
            photo: ref_path,
            position: "CEO".to_string(),
            position_id: "1".to_string(),
        },
    );
    let registry = Registry::from_entries(entries);
    let identities = registry.len();
    let identifier = FaceIdentifier::new(registry, 0.7, &dir.join("history")).unwrap();

    let state = AppState {
        engine: spawn_engine(encoder, identifier),
        tolerance: 0.7,
        identities,
    };
    TestServer::new(router(state)).unwrap()
}

#[tokio::test]
async fn identify_success() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    let response = server
        .post("/api/identify")
        .json(&json!({ "id": "0001", "image": photo_png_base64([1, 100, 50]) }))
        .await;

    assert_eq!(response.status_code(), 200);
    let report: Value = response.json();
    assert_eq!(report["outcome"], "success");
    assert_eq!(report["position"], "CEO");
    assert_eq!(report["position_id"], "1");
    assert_eq!(report["attempt"], 0);
    assert!(report["confidence"].as_f64().unwrap() > 0.99);
    assert!(report.get("reason").is_none());
}

#[tokio::test]
async fn identify_different_person() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    let response = server
        .post("/api/identify")
        .json(&json!({ "id": "0001", "image": photo_png_base64([1, 255, 255]) }))
        .await;

    assert_eq!(response.status_code(), 200);
    let report: Value = response.json();
    assert_eq!(report["outcome"], "failure");
    assert_eq!(report["reason"], "different-person");
}

#[tokio::test]
async fn identify_unknown_identity() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    let response = server
        .post("/api/identify")
        .json(&json!({ "id": "9999", "image": photo_png_base64([1, 100, 50]) }))
        .await;

    assert_eq!(response.status_code(), 200);
    let report: Value = response.json();
    assert_eq!(report["outcome"], "failure");
    assert_eq!(report["reason"], "unknown-identity");
    assert!(report.get("position").is_none());
}

#[tokio::test]
async fn identify_rejects_bad_base64() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    let response = server
        .post("/api/identify")
        .json(&json!({ "id": "0001", "image": "@@not base64@@" }))
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn identify_rejects_undecodable_image() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    let response = server
        .post("/api/identify")
        .json(&json!({ "id": "0001", "image": BASE64.encode(b"not an image") }))
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn identify_rejects_path_like_id() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    let response = server
        .post("/api/identify")
        .json(&json!({ "id": "../etc", "image": photo_png_base64([1, 100, 50]) }))
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn identify_rejects_malformed_body() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    let response = server
        .post("/api/identify")
        .json(&json!({ "id": "0001" }))
        .await;

    // axum's Json extractor rejects the missing field
    assert_eq!(response.status_code(), 422);
}

#[tokio::test]
async fn dead_engine_surfaces_as_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server_with(Box::new(CrashingEncoder), dir.path());

    // The engine thread dies on this request; the handler must answer 500,
    // not hang on the dropped reply channel.
    let response = server
        .post("/api/identify")
        .json(&json!({ "id": "0001", "image": photo_png_base64([1, 100, 50]) }))
        .await;
    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body["error"], "internal error");

    // Later requests hit the closed channel and get 500 as well.
    let response = server.get("/api/attempts/0001").await;
    assert_eq!(response.status_code(), 500);
}

#[tokio::test]
async fn status_reports_daemon_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    let response = server.get("/api/status").await;
    assert_eq!(response.status_code(), 200);
    let status: Value = response.json();
    assert_eq!(status["identities"], 1);
    assert!((status["tolerance"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    assert!(status["version"].is_string());
}

#[tokio::test]
async fn attempts_track_per_identity() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(dir.path());

    for _ in 0..2 {
        server
            .post("/api/identify")
            .json(&json!({ "id": "0001", "image": photo_png_base64([1, 100, 50]) }))
            .await;
    }

    let response = server.get("/api/attempts/0001").await;
    assert_eq!(response.status_code(), 200);
    let record: Value = response.json();
    assert_eq!(record["id"], "0001");
    assert_eq!(record["count"], 2);
    assert_eq!(record["timestamps"].as_array().unwrap().len(), 2);

    let untouched = server.get("/api/attempts/0002").await;
    let record: Value = untouched.json();
    assert_eq!(record["count"], 0);
}
