//! Classifier side of the glyph recognition service: label registries,
//! model gateways, ranking, and the service that ties them to the
//! preprocessing pipeline.

pub mod backend;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod labels;
pub mod ranking;
pub mod service;
pub mod upload;

pub use backend::{BackendOptions, InferenceBackend};
pub use classifier::{ClassifierGateway, Forward, ModelLoad};
pub use config::{ClassifierConfig, ServiceConfig, UploadPolicy};
pub use errors::{InferenceError, ServiceError};
pub use labels::{
    ClassLabelRegistry, ClassifierKind, LabelLoad, LabelSource, UNKNOWN_LABEL, glyph_name,
};
pub use ranking::{PredictionRanker, RankedLabel, Ranking};
pub use service::{PredictionResult, PredictionService, RawImage};
