use crate::backend::BackendOptions;
use crate::labels::ClassifierKind;
use crate::ranking::DEFAULT_TOP_K;
use preprocess::PreprocessConfig;
use std::path::PathBuf;

pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".bmp"];

/// Where one classifier's artifacts live.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub kind: ClassifierKind,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub backend: BackendOptions,
}

impl ClassifierConfig {
    pub fn default_for(kind: ClassifierKind) -> Self {
        let (model, labels) = match kind {
            ClassifierKind::Character => ("urdu_cnn_model.onnx", "class_labels.json"),
            ClassifierKind::Digit => ("urdu_digit_model.onnx", "digit_class_labels.json"),
        };
        Self {
            kind,
            model_path: PathBuf::from("saved_models").join(model),
            labels_path: PathBuf::from("saved_models").join(labels),
            backend: BackendOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadPolicy {
    /// Lowercase, with the leading dot.
    pub allowed_extensions: Vec<String>,
    pub max_file_size: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub preprocess: PreprocessConfig,
    pub upload: UploadPolicy,
    pub top_k: usize,
    pub characters: ClassifierConfig,
    pub digits: ClassifierConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            upload: UploadPolicy::default(),
            top_k: DEFAULT_TOP_K,
            characters: ClassifierConfig::default_for(ClassifierKind::Character),
            digits: ClassifierConfig::default_for(ClassifierKind::Digit),
        }
    }
}
