use crate::labels::ClassifierKind;
use preprocess::{PreprocessError, PreprocessStep};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("The {kind} model is not loaded")]
    ModelNotLoaded { kind: ClassifierKind },

    /// The backend failed during the forward pass. `reason` keeps the
    /// backend's own message.
    #[error("{kind} prediction failed: {reason}")]
    PredictionFailed { kind: ClassifierKind, reason: String },

    /// The model file exists but could not be turned into a session.
    #[error("Failed to load model from {}: {reason}", .path.display())]
    ModelLoadFailed { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unsupported image format: '{extension}'. Supported formats: {}", .allowed.join(", "))]
    UnsupportedFormat {
        extension: String,
        allowed: Vec<String>,
    },

    #[error(
        "File size ({:.2} MB) exceeds maximum allowed size ({:.2} MB)",
        mebibytes(.size),
        mebibytes(.max)
    )]
    ImageTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ServiceError {
    /// Stable name of the error kind, safe to show to clients.
    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::UnsupportedFormat { .. } => "UnsupportedFormat",
            ServiceError::ImageTooLarge { .. } => "ImageTooLarge",
            ServiceError::Preprocess(PreprocessError::InvalidImage { .. }) => "InvalidImage",
            ServiceError::Preprocess(PreprocessError::ProcessingFailed { .. }) => {
                "ImageProcessingFailed"
            }
            ServiceError::Inference(InferenceError::ModelNotLoaded { .. }) => "ModelNotLoaded",
            ServiceError::Inference(InferenceError::PredictionFailed { .. }) => "PredictionFailed",
            ServiceError::Inference(InferenceError::ModelLoadFailed { .. }) => "ModelLoadFailed",
        }
    }

    /// Step that failed, for processing failures.
    pub fn failed_step(&self) -> Option<PreprocessStep> {
        match self {
            ServiceError::Preprocess(PreprocessError::ProcessingFailed { step, .. }) => Some(*step),
            _ => None,
        }
    }
}

fn mebibytes(bytes: &usize) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}
