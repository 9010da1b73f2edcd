use std::fmt;
use thiserror::Error;

/// Stage of the preprocessing pipeline, reported when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessStep {
    Grayscale,
    Inversion,
    Resize,
    Normalize,
    Reshape,
}

impl PreprocessStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreprocessStep::Grayscale => "grayscale",
            PreprocessStep::Inversion => "inversion",
            PreprocessStep::Resize => "resize",
            PreprocessStep::Normalize => "normalize",
            PreprocessStep::Reshape => "reshape",
        }
    }
}

impl fmt::Display for PreprocessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PreprocessError {
    /// The payload could not be decoded as an image at all.
    #[error("Invalid image{}: {reason}", filename_context(.filename))]
    InvalidImage {
        reason: String,
        filename: Option<String>,
    },

    #[error("Image processing failed during {step}: {reason}")]
    ProcessingFailed {
        step: PreprocessStep,
        reason: String,
    },
}

impl PreprocessError {
    pub(crate) fn failed(step: PreprocessStep, reason: impl fmt::Display) -> Self {
        PreprocessError::ProcessingFailed {
            step,
            reason: reason.to_string(),
        }
    }
}

fn filename_context(filename: &Option<String>) -> String {
    filename
        .as_deref()
        .map(|name| format!(" '{name}'"))
        .unwrap_or_default()
}
