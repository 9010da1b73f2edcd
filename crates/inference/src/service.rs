use crate::{
    backend::InferenceBackend,
    classifier::{ClassifierGateway, ModelLoad},
    config::{ServiceConfig, UploadPolicy},
    errors::{InferenceError, ServiceError},
    labels::{ClassLabelRegistry, ClassifierKind},
    ranking::{PredictionRanker, RankedLabel, Ranking},
};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use preprocess::{CpuPreProcessor, PreprocessedTensor};
use std::sync::Arc;
use std::time::Instant;

/// Decimal places kept on the reported latency.
const LATENCY_DECIMALS: i32 = 2;

/// An image as it arrives at the service boundary.
#[derive(Debug, Clone)]
pub enum RawImage {
    /// A multipart file upload.
    Upload { filename: String, bytes: Vec<u8> },
    /// A base64 canvas drawing, optionally wrapped in a data URL.
    Canvas { payload: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub top_label: String,
    pub confidence: f32,
    pub ranked: Vec<RankedLabel>,
    pub latency_ms: f64,
    /// No model was loaded; the result is a placeholder.
    pub degraded: bool,
}

struct Metrics {
    duration: Histogram<f64>,
    predictions: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> Metrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0,
    ];
    let duration = meter
        .f64_histogram("prediction_duration_seconds")
        .with_description("Time to serve one prediction (validate + preprocess + infer + rank)")
        .with_unit("s")
        .with_boundaries(latency_buckets.to_vec())
        .build();
    let predictions = meter
        .u64_counter("predictions_total")
        .with_description("Predictions served, by classifier and mode")
        .build();

    Metrics {
        duration,
        predictions,
    }
}

/// Orchestrates validation, preprocessing, inference and ranking for both
/// classifiers. One instance lives for the whole process and is shared by
/// every request handler.
pub struct PredictionService<B: InferenceBackend> {
    preprocessor: CpuPreProcessor,
    characters: ClassifierGateway<B>,
    digits: ClassifierGateway<B>,
    ranker: PredictionRanker,
    upload: UploadPolicy,
    metrics: Metrics,
}

impl<B: InferenceBackend> PredictionService<B> {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            preprocessor: CpuPreProcessor::from_config(&config.preprocess),
            characters: ClassifierGateway::new(config.characters),
            digits: ClassifierGateway::new(config.digits),
            ranker: PredictionRanker::new(config.top_k),
            upload: config.upload,
            metrics: init_metrics("prediction"),
        }
    }

    /// Tries to load both models. A missing or broken artifact leaves that
    /// classifier unloaded and serving degraded responses.
    pub fn load_models(&self) {
        for kind in ClassifierKind::ALL {
            match self.gateway(kind).load_configured() {
                Ok(ModelLoad::Loaded) => {}
                Ok(ModelLoad::NotFound) => tracing::warn!(
                    %kind,
                    "No trained model found, serving placeholder predictions"
                ),
                Err(e) => tracing::warn!(
                    %kind,
                    error = %e,
                    "Model failed to load, serving placeholder predictions"
                ),
            }
        }
    }

    pub fn unload_models(&self) {
        for kind in ClassifierKind::ALL {
            self.gateway(kind).unload();
        }
    }

    pub fn gateway(&self, kind: ClassifierKind) -> &ClassifierGateway<B> {
        match kind {
            ClassifierKind::Character => &self.characters,
            ClassifierKind::Digit => &self.digits,
        }
    }

    pub fn is_loaded(&self, kind: ClassifierKind) -> bool {
        self.gateway(kind).is_loaded()
    }

    /// Current labels of one classifier.
    pub fn classes(&self, kind: ClassifierKind) -> Arc<ClassLabelRegistry> {
        self.gateway(kind).labels()
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        &self.upload
    }

    /// Full pipeline for one image. Blocking: run it off the async runtime.
    pub fn predict_image(
        &self,
        kind: ClassifierKind,
        image: RawImage,
    ) -> Result<PredictionResult, ServiceError> {
        let span = tracing::info_span!("predict", %kind);
        let _enter = span.enter();
        let start = Instant::now();

        let tensor = self.prepare(&image)?;
        let gateway = self.gateway(kind);

        let result = if gateway.is_loaded() {
            match self.classify(gateway, &tensor) {
                Ok(result) => result,
                // unloaded between the check and the forward pass
                Err(InferenceError::ModelNotLoaded { .. }) => self.degraded(gateway),
                Err(e) => return Err(e.into()),
            }
        } else {
            self.degraded(gateway)
        };

        let mode = if result.degraded { "degraded" } else { "model" };
        let attributes = [
            KeyValue::new("kind", kind.as_str()),
            KeyValue::new("mode", mode),
        ];
        self.metrics
            .duration
            .record(start.elapsed().as_secs_f64(), &attributes);
        self.metrics.predictions.add(1, &attributes);

        tracing::debug!(
            top_label = %result.top_label,
            confidence = result.confidence,
            latency_ms = result.latency_ms,
            mode,
            "Prediction served"
        );

        Ok(result)
    }

    fn prepare(&self, image: &RawImage) -> Result<PreprocessedTensor, ServiceError> {
        let _s = tracing::info_span!("preprocess").entered();
        let tensor = match image {
            RawImage::Upload { filename, bytes } => {
                self.upload.validate(filename, bytes.len())?;
                self.preprocessor.preprocess_upload(bytes, filename)?
            }
            RawImage::Canvas { payload } => self.preprocessor.preprocess_canvas(payload)?,
        };
        Ok(tensor)
    }

    fn classify(
        &self,
        gateway: &ClassifierGateway<B>,
        tensor: &PreprocessedTensor,
    ) -> Result<PredictionResult, InferenceError> {
        let forward = gateway.predict(tensor)?;
        let labels = gateway.labels();
        let Ranking {
            top_label,
            confidence,
            ranked,
        } = self.ranker.rank(&forward.probabilities, &labels);

        Ok(PredictionResult {
            top_label,
            confidence,
            ranked,
            latency_ms: round_latency(forward.latency_ms),
            degraded: false,
        })
    }

    /// Placeholder answer for a classifier with no model: zero confidence
    /// over the first k labels, zero latency.
    fn degraded(&self, gateway: &ClassifierGateway<B>) -> PredictionResult {
        let labels = gateway.labels();
        let ranked = labels
            .all()
            .iter()
            .take(self.ranker.k)
            .map(|label| RankedLabel {
                label: label.clone(),
                probability: 0.0,
            })
            .collect();

        PredictionResult {
            top_label: gateway.kind().placeholder_label().to_string(),
            confidence: 0.0,
            ranked,
            latency_ms: 0.0,
            degraded: true,
        }
    }
}

fn round_latency(latency_ms: f64) -> f64 {
    let factor = 10f64.powi(LATENCY_DECIMALS);
    (latency_ms * factor).round() / factor
}
