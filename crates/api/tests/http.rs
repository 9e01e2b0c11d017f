//! HTTP surface tests against a stub-backed service

use api::{create_router, AppState, PredictionService, ServiceConfig};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use image::{ImageFormat, RgbImage};
use inference_engine::InferenceEngine;
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "leafscan-test-boundary";

fn app_with(engine: InferenceEngine) -> Router {
    app_with_config(ServiceConfig::default(), engine)
}

fn app_with_config(config: ServiceConfig, engine: InferenceEngine) -> Router {
    let service = PredictionService::from_config(&config, engine);
    create_router(Arc::new(AppState::new(service, config)))
}

fn stub_app() -> Router {
    app_with(InferenceEngine::stub())
}

fn encode(width: u32, height: u32, rgb: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// Single-part multipart body. `filename: None` sends a plain form value.
fn multipart_body(field: &str, filename: Option<&str>, bytes: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{}\"; filename=\"{}\"", field, name),
        None => format!("form-data; name=\"{}\"", field),
    };
    let mut body = format!(
        "--{}\r\nContent-Disposition: {}\r\nContent-Type: application/octet-stream\r\n\r\n",
        BOUNDARY, disposition
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn predict_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn upload(app: Router, filename: &str, bytes: &[u8]) -> (StatusCode, Value) {
    send(app, predict_request(multipart_body("image", Some(filename), bytes))).await
}

fn assert_error(status: StatusCode, body: &Value, expected: StatusCode, code: &str) {
    assert_eq!(status, expected, "body: {}", body);
    assert_eq!(body["code"], code);
    assert!(body["error"].is_string());
}

fn assert_valid_prediction(body: &Value) {
    assert_eq!(body["success"], true);
    let prediction = &body["prediction"];
    let confidence = prediction["confidence"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&confidence));

    let all = prediction["allPredictions"].as_object().unwrap();
    assert_eq!(all.len(), 4);
    for key in ["bacterial_leaf_blight", "blast", "brown_spot", "healthy"] {
        assert!(all.contains_key(key), "missing {}", key);
    }

    // First maximum in catalog order wins ties
    let order = ["bacterial_leaf_blight", "blast", "brown_spot", "healthy"];
    let mut top = order[0];
    for key in order {
        if all[key].as_f64().unwrap() > all[top].as_f64().unwrap() {
            top = key;
        }
    }
    assert_eq!(prediction["class"], top);
    assert_eq!(all[top].as_f64().unwrap(), confidence);
    assert!(prediction["classVi"].is_string());
    assert!(body["processingTime"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn test_health_with_model() {
    let (status, body) = get(stub_app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["service"], "rice-disease-detection");
}

#[tokio::test]
async fn test_health_degraded() {
    let (status, body) = get(app_with(InferenceEngine::unloaded()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], false);
}

#[tokio::test]
async fn test_index() {
    let (status, body) = get(stub_app(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "Rice Leaf Disease Detection API");
    assert_eq!(body["version"], "1.0.0");
    assert_eq!(body["endpoints"]["health"], "/health");
    assert_eq!(body["model"]["input_size"], "224x224");
    assert_eq!(body["model"]["loaded"], true);
    assert_eq!(body["model"]["classes"]["brown_spot"], "Bệnh đốm nâu");
    assert_eq!(body["model"]["classes"].as_object().unwrap().len(), 4);
}

#[tokio::test]
async fn test_index_degraded_reports_configured_format() {
    let (_, body) = get(app_with(InferenceEngine::unloaded()), "/").await;
    assert_eq!(body["model"]["loaded"], false);
    assert_eq!(body["model"]["format"], "TFLite");
}

#[tokio::test]
async fn test_predict_png() {
    let bytes = encode(320, 240, [45, 160, 50], ImageFormat::Png);
    let (status, body) = upload(stub_app(), "leaf.png", &bytes).await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_valid_prediction(&body);
}

#[tokio::test]
async fn test_predict_jpeg_with_uppercase_extension() {
    let bytes = encode(500, 375, [140, 100, 40], ImageFormat::Jpeg);
    let (status, body) = upload(stub_app(), "IMG_0042.JPG", &bytes).await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_valid_prediction(&body);
}

#[tokio::test]
async fn test_predict_webp() {
    let bytes = encode(100, 100, [180, 170, 60], ImageFormat::WebP);
    let (status, body) = upload(stub_app(), "leaf.webp", &bytes).await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_valid_prediction(&body);
}

#[tokio::test]
async fn test_gif_is_rejected() {
    let (status, body) = upload(stub_app(), "leaf.gif", b"GIF89a\x01\x00\x01\x00\x00\x00\x00;").await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "INVALID_FILE_TYPE");
    assert_eq!(body["error"], "Invalid file type. Allowed: png, jpg, jpeg, webp");
}

#[tokio::test]
async fn test_filename_without_extension_is_rejected() {
    let bytes = encode(10, 10, [0, 255, 0], ImageFormat::Png);
    let (status, body) = upload(stub_app(), "leaf", &bytes).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "INVALID_FILE_TYPE");
}

#[tokio::test]
async fn test_missing_image_field() {
    let bytes = encode(10, 10, [0, 255, 0], ImageFormat::Png);
    let request = predict_request(multipart_body("photo", Some("leaf.png"), &bytes));
    let (status, body) = send(stub_app(), request).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "NO_IMAGE");
    assert_eq!(body["error"], "No image file provided");
}

#[tokio::test]
async fn test_image_field_without_filename_is_not_a_file() {
    let request = predict_request(multipart_body("image", None, b"plain form value"));
    let (status, body) = send(stub_app(), request).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "NO_IMAGE");
}

#[tokio::test]
async fn test_non_multipart_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(stub_app(), request).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "NO_IMAGE");
}

#[tokio::test]
async fn test_empty_filename() {
    let bytes = encode(10, 10, [0, 255, 0], ImageFormat::Png);
    let (status, body) = upload(stub_app(), "", &bytes).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "EMPTY_FILENAME");
    assert_eq!(body["error"], "Empty filename");
}

#[tokio::test]
async fn test_oversized_upload() {
    let bytes = vec![0u8; 10 * 1024 * 1024 + 1];
    let (status, body) = upload(stub_app(), "leaf.png", &bytes).await;
    assert_error(status, &body, StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE");
    assert_eq!(body["error"], "File too large (max 10MB)");
}

#[tokio::test]
async fn test_size_message_follows_configured_limit() {
    let config = ServiceConfig {
        max_upload_bytes: 64 * 1024,
        ..ServiceConfig::default()
    };
    let bytes = vec![0u8; 64 * 1024 + 1];
    let (status, body) = upload(app_with_config(config, InferenceEngine::stub()), "leaf.png", &bytes).await;
    assert_error(status, &body, StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE");
    assert_eq!(body["error"], "File too large (max 64KB)");
}

#[tokio::test]
async fn test_undecodable_image_is_prediction_error() {
    let (status, body) = upload(stub_app(), "leaf.jpg", b"this is not a jpeg").await;
    assert_error(status, &body, StatusCode::INTERNAL_SERVER_ERROR, "PREDICTION_ERROR");
}

#[tokio::test]
async fn test_predict_without_model() {
    let bytes = encode(64, 64, [45, 160, 50], ImageFormat::Png);
    let (status, body) = upload(app_with(InferenceEngine::unloaded()), "leaf.png", &bytes).await;
    assert_error(status, &body, StatusCode::INTERNAL_SERVER_ERROR, "PREDICTION_ERROR");
    assert_eq!(body["error"], "Model not loaded");
}

#[tokio::test]
async fn test_identical_uploads_give_identical_predictions() {
    let app = stub_app();
    let bytes = encode(256, 256, [120, 130, 70], ImageFormat::Png);
    let (_, first) = upload(app.clone(), "leaf.png", &bytes).await;
    let (_, second) = upload(app, "leaf.png", &bytes).await;
    assert_eq!(first["prediction"], second["prediction"]);
}

#[tokio::test]
async fn test_solid_color_has_dominant_class() {
    for rgb in [[0, 0, 0], [255, 255, 255], [30, 200, 40], [160, 90, 20]] {
        let bytes = encode(224, 224, rgb, ImageFormat::Png);
        let (status, body) = upload(stub_app(), "solid.png", &bytes).await;
        assert_eq!(status, StatusCode::OK);
        let confidence = body["prediction"]["confidence"].as_f64().unwrap();
        for (_, pct) in body["prediction"]["allPredictions"].as_object().unwrap() {
            assert!(confidence >= pct.as_f64().unwrap());
        }
    }
}

#[tokio::test]
async fn test_metrics_disabled_without_exporter() {
    let response = stub_app()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
