use preprocess::PreprocessedTensor;
use std::path::Path;

#[cfg(feature = "ort-backend")]
pub mod ort;

pub const DEFAULT_INTRA_THREADS: usize = 4;

/// Runtime settings handed to [`InferenceBackend::load_model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    /// Threads one forward pass may use.
    pub intra_threads: usize,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}

/// A model runtime able to run one forward pass over a `[1, H, W, 1]`
/// tensor and return one score per class.
///
/// Anything satisfying this can sit behind a
/// [`ClassifierGateway`](crate::ClassifierGateway); preprocessing, ranking
/// and HTTP code never see the runtime.
pub trait InferenceBackend: Send + 'static {
    fn load_model(path: &Path, options: &BackendOptions) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run inference on a preprocessed batch of one.
    fn infer(&mut self, input: &PreprocessedTensor) -> anyhow::Result<Vec<f32>>;

    /// Number of scores `infer` produces, when the runtime can tell up front.
    fn output_len(&self) -> Option<usize> {
        None
    }
}
