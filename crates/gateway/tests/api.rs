use axum::{
    Router,
    body::{self, Body},
    http::{Request, StatusCode},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use gateway::{AppState, RouterConfig, build_router};
use image::{GrayImage, ImageFormat, Luma};
use inference::{
    BackendOptions, ClassifierConfig, ClassifierKind, InferenceBackend, PredictionService,
    ServiceConfig,
};
use preprocess::PreprocessedTensor;
use serde_json::{Value, json};
use std::fs::{self, OpenOptions};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;

/// Reports what the preprocessor handed over: score 0 is the top-left
/// pixel, score 1 the centre pixel, everything else zero.
///
/// The model file holds the class count, or `fail` to make every forward
/// pass error. Each forward pass appends a line to `calls` next to it.
struct PixelEcho {
    classes: usize,
    fail: bool,
    calls: PathBuf,
}

impl InferenceBackend for PixelEcho {
    fn load_model(path: &Path, _options: &BackendOptions) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)?;
        let text = text.trim();
        let calls = path.with_extension("calls");
        if text == "fail" {
            return Ok(Self {
                classes: 0,
                fail: true,
                calls,
            });
        }
        Ok(Self {
            classes: text.parse()?,
            fail: false,
            calls,
        })
    }

    fn infer(&mut self, input: &PreprocessedTensor) -> anyhow::Result<Vec<f32>> {
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.calls)?;
        writeln!(log, "infer")?;

        if self.fail {
            anyhow::bail!("Got invalid dimensions for input: images");
        }

        let (_, height, width, _) = input.dim();
        let mut scores = vec![0.0; self.classes];
        scores[0] = input[[0, 0, 0, 0]];
        scores[1] = input[[0, height / 2, width / 2, 0]];
        Ok(scores)
    }
}

struct TestApp {
    dir: TempDir,
    router: Router,
}

impl TestApp {
    fn calls(&self, kind: ClassifierKind) -> usize {
        let model = match kind {
            ClassifierKind::Character => "chars.calls",
            ClassifierKind::Digit => "digits.calls",
        };
        fs::read_to_string(self.dir.path().join(model))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }
}

/// Each argument is the content of that model file; `None` leaves it absent.
fn spawn_app(characters: Option<&str>, digits: Option<&str>, max_file_size: usize) -> TestApp {
    spawn_app_with(characters, digits, max_file_size, RouterConfig::default())
}

fn spawn_app_with(
    characters: Option<&str>,
    digits: Option<&str>,
    max_file_size: usize,
    router: RouterConfig,
) -> TestApp {
    let dir = tempdir().unwrap();
    let write = |name: &str, content: Option<&str>| {
        if let Some(content) = content {
            fs::write(dir.path().join(name), content).unwrap();
        }
    };
    write("chars.model", characters);
    write("digits.model", digits);

    let mut config = ServiceConfig {
        characters: ClassifierConfig {
            model_path: dir.path().join("chars.model"),
            labels_path: dir.path().join("chars.json"),
            ..ClassifierConfig::default_for(ClassifierKind::Character)
        },
        digits: ClassifierConfig {
            model_path: dir.path().join("digits.model"),
            labels_path: dir.path().join("digits.json"),
            ..ClassifierConfig::default_for(ClassifierKind::Digit)
        },
        ..ServiceConfig::default()
    };
    config.upload.max_file_size = max_file_size;

    let service = PredictionService::<PixelEcho>::new(config);
    service.load_models();
    let router = build_router(AppState::new(service), &router);

    TestApp { dir, router }
}

fn loaded_app() -> TestApp {
    spawn_app(Some("46"), Some("10"), 5 * 1024 * 1024)
}

fn png(img: &GrayImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// xorshift noise, so the PNG does not compress away.
fn noise(width: u32, height: u32) -> GrayImage {
    let mut seed = 0x9E37_79B9u32;
    GrayImage::from_fn(width, height, |_, _| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        Luma([seed as u8])
    })
}

/// White 64x64 canvas with a black disk in the middle.
fn disk_on_white() -> GrayImage {
    GrayImage::from_fn(64, 64, |x, y| {
        let (dx, dy) = (x as f32 - 32.0, y as f32 - 32.0);
        if dx * dx + dy * dy <= 14.0 * 14.0 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

fn upload(uri: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "glyph-test-boundary";
    let mut body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn canvas(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn mid_gray_upload_returns_a_full_prediction() {
    let app = loaded_app();
    let image = GrayImage::from_pixel(100, 100, Luma([128]));

    let request = upload("/api/v1/predict", "gray.png", &png(&image));
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["prediction"].is_string());
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    let top_5 = body["top_5"].as_array().unwrap();
    assert_eq!(top_5.len(), 5);
    for entry in top_5 {
        assert!(entry["character"].is_string());
        assert!((0.0..=1.0).contains(&entry["probability"].as_f64().unwrap()));
    }
    assert!(body["processing_time_ms"].as_f64().unwrap() >= 0.0);
    assert_eq!(app.calls(ClassifierKind::Character), 1);
}

#[tokio::test]
async fn gif_upload_is_rejected_before_inference() {
    let app = loaded_app();

    let request = upload("/api/v1/predict", "test.gif", b"GIF89a....");
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "UnsupportedFormat");
    assert!(body["detail"].as_str().unwrap().contains(".png"));
    assert_eq!(app.calls(ClassifierKind::Character), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected_before_inference() {
    let app = spawn_app(Some("46"), Some("10"), 1024);

    let request = upload("/api/v1/predict/digit", "big.png", &png(&noise(200, 200)));
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "ImageTooLarge");
    assert!(body["detail"].as_str().unwrap().contains("MB"));
    assert_eq!(app.calls(ClassifierKind::Digit), 0);
}

#[tokio::test]
async fn upload_over_default_cap_reports_its_size() {
    let app = loaded_app();
    let six_mib = vec![0u8; 6 * 1024 * 1024];

    let (status, body) = send(&app, upload("/api/v1/predict", "big.png", &six_mib)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error_type"], "ImageTooLarge");
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("6.00 MB"), "{detail}");
    assert!(detail.contains("5.00 MB"), "{detail}");
    assert_eq!(app.calls(ClassifierKind::Character), 0);
}

#[tokio::test]
async fn upload_cut_off_by_the_body_limit_is_still_too_large() {
    let app = spawn_app(Some("46"), Some("10"), 1024);
    let huge = vec![7u8; 512 * 1024];

    let (status, body) = send(&app, upload("/api/v1/predict", "huge.bmp", &huge)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error_type"], "ImageTooLarge");
    assert_eq!(app.calls(ClassifierKind::Character), 0);
}

#[tokio::test]
async fn oversized_gif_is_rejected_for_its_format() {
    let app = spawn_app(Some("46"), Some("10"), 1024);
    let huge = vec![0u8; 512 * 1024];

    let (status, body) = send(&app, upload("/api/v1/predict", "huge.gif", &huge)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "UnsupportedFormat");
}

#[tokio::test]
async fn corrupt_upload_names_the_file() {
    let app = loaded_app();

    let request = upload("/api/v1/predict", "scan.png", b"not really a png");
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "InvalidImage");
    assert!(body["detail"].as_str().unwrap().contains("scan.png"));
}

#[tokio::test]
async fn upload_without_file_field_is_a_bad_request() {
    let app = loaded_app();
    let boundary = "b";
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/predict")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"other\"\r\n\r\n\
             hello\r\n--{boundary}--\r\n"
        )))
        .unwrap();

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "InvalidRequest");
}

#[tokio::test]
async fn canvas_drawing_is_inverted_before_inference() {
    let app = loaded_app();
    let payload = format!("data:image/png;base64,{}", STANDARD.encode(png(&disk_on_white())));

    let (status, body) = send(
        &app,
        canvas("/api/v1/predict/canvas", json!({ "image_data": payload })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    // score 1 is the centre pixel, score 0 the corner
    assert_eq!(body["prediction"], "ب");
    assert_eq!(body["confidence"].as_f64().unwrap(), 1.0);
    let top_5 = body["top_5"].as_array().unwrap();
    let corner = top_5
        .iter()
        .find(|entry| entry["character"] == "ا")
        .unwrap();
    assert_eq!(corner["probability"].as_f64().unwrap(), 0.0);
}

#[tokio::test]
async fn digit_canvas_uses_the_digit_model() {
    let app = loaded_app();
    let payload = STANDARD.encode(png(&disk_on_white()));

    let (status, body) = send(
        &app,
        canvas("/api/v1/predict/digit/canvas", json!({ "image_data": payload })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["prediction"], "۱");
    assert_eq!(app.calls(ClassifierKind::Digit), 1);
    assert_eq!(app.calls(ClassifierKind::Character), 0);
}

#[tokio::test]
async fn canvas_is_not_bound_by_the_upload_cap() {
    let app = spawn_app(Some("46"), Some("10"), 1024);
    let payload = STANDARD.encode(png(&noise(300, 300)));
    assert!(payload.len() > 100 * 1024);

    let request = canvas("/api/v1/predict/canvas", json!({ "image_data": payload }));
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.calls(ClassifierKind::Character), 1);
}

#[tokio::test]
async fn canvas_over_its_own_cap_is_refused() {
    let router = RouterConfig {
        max_canvas_size: 1024,
        ..RouterConfig::default()
    };
    let app = spawn_app_with(Some("46"), Some("10"), 5 * 1024 * 1024, router);
    let payload = STANDARD.encode(png(&noise(64, 64)));

    let request = canvas("/api/v1/predict/canvas", json!({ "image_data": payload }));
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error_type"], "InvalidRequest");
    assert_eq!(app.calls(ClassifierKind::Character), 0);
}

#[tokio::test]
async fn malformed_canvas_body_is_rejected() {
    let app = loaded_app();

    let request = canvas("/api/v1/predict/canvas", json!({ "image": "x" }));
    let (status, body) = send(&app, request).await;

    assert!(status.is_client_error());
    assert_eq!(body["error_type"], "InvalidRequest");
}

#[tokio::test]
async fn undecodable_canvas_payload_is_invalid_image() {
    let app = loaded_app();

    let (status, body) = send(
        &app,
        canvas("/api/v1/predict/canvas", json!({ "image_data": "data:image/png;base64,!!!" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "InvalidImage");
}

#[tokio::test]
async fn classes_list_both_default_registries() {
    let app = loaded_app();

    let (status, characters) = send(&app, get("/api/v1/classes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(characters["count"], 46);
    assert_eq!(characters["classes"].as_array().unwrap().len(), 46);
    assert_eq!(characters["classes"][0], "ا");
    assert_eq!(characters["names"][0], "Alif");

    let (status, digits) = send(&app, get("/api/v1/classes/digits")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(digits["count"], 10);
    assert_eq!(digits["classes"][0], "۰");
}

#[tokio::test]
async fn missing_models_serve_degraded_predictions() {
    let app = spawn_app(None, None, 5 * 1024 * 1024);
    let image = GrayImage::from_pixel(64, 64, Luma([0]));

    let (status, health) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["model_loaded"], false);
    assert_eq!(health["digit_model_loaded"], false);

    let request = upload("/api/v1/predict/digit", "zero.png", &png(&image));
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["prediction"], "۰");
    assert_eq!(body["confidence"].as_f64().unwrap(), 0.0);
    assert_eq!(body["processing_time_ms"].as_f64().unwrap(), 0.0);
    let top_5 = body["top_5"].as_array().unwrap();
    assert_eq!(top_5.len(), 5);
    assert!(top_5.iter().all(|e| e["probability"].as_f64().unwrap() == 0.0));
}

#[tokio::test]
async fn health_reports_each_model_independently() {
    let app = spawn_app(Some("46"), None, 5 * 1024 * 1024);

    let (_, health) = send(&app, get("/health")).await;

    assert_eq!(health["model_loaded"], true);
    assert_eq!(health["digit_model_loaded"], false);
    assert!(health["version"].is_string());
}

#[tokio::test]
async fn backend_failures_surface_as_prediction_failed() {
    let app = spawn_app(Some("fail"), Some("10"), 5 * 1024 * 1024);
    let image = GrayImage::from_pixel(64, 64, Luma([0]));

    let (status, body) = send(&app, upload("/api/v1/predict", "x.png", &png(&image))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error_type"], "PredictionFailed");
    assert!(body["detail"].as_str().unwrap().contains("invalid dimensions"));
}

#[tokio::test]
async fn root_greets_with_version() {
    let app = loaded_app();

    let (status, body) = send(&app, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
