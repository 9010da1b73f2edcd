use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::Field, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    routing::{get, post},
};
use inference::{
    ClassifierKind, InferenceBackend, PredictionResult, RawImage, ServiceError, UploadPolicy,
    glyph_name,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Oversized uploads are read and discarded up to this multiple of the
/// file cap, so the rejection can report their real size.
const UPLOAD_DRAIN_FACTOR: usize = 4;

pub const DEFAULT_MAX_CANVAS_SIZE: usize = 16 * 1024 * 1024;

/// HTTP concerns that sit outside the prediction pipeline.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Largest canvas request body, base64 and JSON framing included.
    pub max_canvas_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            max_canvas_size: DEFAULT_MAX_CANVAS_SIZE,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CanvasRequest {
    pub image_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopPrediction {
    pub character: String,
    pub probability: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: String,
    pub confidence: f32,
    pub top_5: Vec<TopPrediction>,
    pub processing_time_ms: f64,
}

impl From<PredictionResult> for PredictionResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            prediction: result.top_label,
            confidence: result.confidence,
            top_5: result
                .ranked
                .into_iter()
                .map(|r| TopPrediction {
                    character: r.label,
                    probability: r.probability,
                })
                .collect(),
            processing_time_ms: result.latency_ms,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassesResponse {
    pub classes: Vec<String>,
    pub count: usize,
    /// Romanized names aligned with `classes`, when every label has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub digit_model_loaded: bool,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
}

/// Builds the full HTTP surface.
///
/// Upload and canvas routes carry separate body limits: uploads are bounded
/// by the file cap, canvases by `max_canvas_size`.
pub fn build_router<B: InferenceBackend>(state: AppState<B>, config: &RouterConfig) -> Router {
    let upload_limit = DefaultBodyLimit::max(
        state
            .service
            .upload_policy()
            .max_file_size
            .saturating_mul(UPLOAD_DRAIN_FACTOR)
            .saturating_add(MULTIPART_OVERHEAD),
    );
    let canvas_limit = DefaultBodyLimit::max(config.max_canvas_size);

    let api = Router::new()
        .route("/predict", post(predict_character::<B>).layer(upload_limit))
        .route("/predict/digit", post(predict_digit::<B>).layer(upload_limit))
        .route(
            "/predict/canvas",
            post(predict_character_canvas::<B>).layer(canvas_limit),
        )
        .route(
            "/predict/digit/canvas",
            post(predict_digit_canvas::<B>).layer(canvas_limit),
        )
        .route("/classes", get(character_classes::<B>))
        .route("/classes/digits", get(digit_classes::<B>));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health::<B>))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_origins)),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Urdu character recognition API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn health<B: InferenceBackend>(State(state): State<AppState<B>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.service.is_loaded(ClassifierKind::Character),
        digit_model_loaded: state.service.is_loaded(ClassifierKind::Digit),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn predict_character<B: InferenceBackend>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    predict_upload(state, ClassifierKind::Character, &headers, multipart).await
}

async fn predict_digit<B: InferenceBackend>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    predict_upload(state, ClassifierKind::Digit, &headers, multipart).await
}

async fn predict_character_canvas<B: InferenceBackend>(
    State(state): State<AppState<B>>,
    body: Result<Json<CanvasRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    predict_canvas(state, ClassifierKind::Character, body).await
}

async fn predict_digit_canvas<B: InferenceBackend>(
    State(state): State<AppState<B>>,
    body: Result<Json<CanvasRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    predict_canvas(state, ClassifierKind::Digit, body).await
}

async fn character_classes<B: InferenceBackend>(
    State(state): State<AppState<B>>,
) -> Json<ClassesResponse> {
    Json(classes(&state, ClassifierKind::Character))
}

async fn digit_classes<B: InferenceBackend>(
    State(state): State<AppState<B>>,
) -> Json<ClassesResponse> {
    Json(classes(&state, ClassifierKind::Digit))
}

async fn predict_upload<B: InferenceBackend>(
    state: AppState<B>,
    kind: ClassifierKind,
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    let policy = state.service.upload_policy();

    let (filename, bytes) = loop {
        let field = match multipart.next_field().await {
            Ok(field) => field,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                let size = content_length(headers).unwrap_or(policy.max_file_size + 1);
                return Err(ServiceError::ImageTooLarge {
                    size,
                    max: policy.max_file_size,
                }
                .into());
            }
            Err(e) => {
                return Err(ApiError::Request {
                    status: e.status(),
                    detail: e.body_text(),
                });
            }
        };
        let Some(field) = field else {
            return Err(ApiError::Request {
                status: StatusCode::BAD_REQUEST,
                detail: "Missing multipart field 'file'".to_string(),
            });
        };
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        policy.check_extension(&filename)?;
        let bytes = read_capped(field, &filename, policy).await?;
        break (filename, bytes);
    };

    tracing::debug!(%kind, %filename, size = bytes.len(), "Received upload");

    let image = RawImage::Upload { filename, bytes };
    run_prediction(state, kind, image).await
}

/// Streams one file field, keeping at most `max_file_size` bytes.
///
/// Past the cap the rest of the field is counted and dropped. If the body
/// limit cuts the stream first, the bytes seen so far are reported.
async fn read_capped(
    mut field: Field<'_>,
    filename: &str,
    policy: &UploadPolicy,
) -> Result<Vec<u8>, ApiError> {
    let mut bytes = Vec::new();
    let mut size = 0usize;

    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                size += chunk.len();
                if size <= policy.max_file_size {
                    bytes.extend_from_slice(&chunk);
                }
            }
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => break,
            Err(e) => {
                return Err(ApiError::Request {
                    status: e.status(),
                    detail: e.body_text(),
                });
            }
        }
    }

    policy.check_size(filename, size)?;
    Ok(bytes)
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

async fn predict_canvas<B: InferenceBackend>(
    state: AppState<B>,
    kind: ClassifierKind,
    body: Result<Json<CanvasRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::Request {
        status: e.status(),
        detail: e.body_text(),
    })?;

    let image = RawImage::Canvas {
        payload: request.image_data,
    };
    run_prediction(state, kind, image).await
}

/// Decoding, preprocessing and the forward pass all block, so the whole
/// pipeline runs on the blocking pool.
async fn run_prediction<B: InferenceBackend>(
    state: AppState<B>,
    kind: ClassifierKind,
    image: RawImage,
) -> Result<Json<PredictionResponse>, ApiError> {
    let service = Arc::clone(&state.service);
    let result = tokio::task::spawn_blocking(move || service.predict_image(kind, image))
        .await
        .map_err(|e| ApiError::Internal(format!("prediction task failed: {e}")))?
        .map_err(ApiError::from)?;

    Ok(Json(result.into()))
}

fn classes<B: InferenceBackend>(state: &AppState<B>, kind: ClassifierKind) -> ClassesResponse {
    let labels = state.service.classes(kind);
    let classes = labels.all().to_vec();
    let names = classes
        .iter()
        .map(|label| glyph_name(label).map(str::to_string))
        .collect::<Option<Vec<_>>>();

    ClassesResponse {
        count: classes.len(),
        classes,
        names,
    }
}
