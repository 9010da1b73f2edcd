use super::{BackendOptions, InferenceBackend};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use preprocess::PreprocessedTensor;
use std::path::Path;

/// Defaults to CUDA when built with the `cuda` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    #[cfg_attr(not(feature = "cuda"), default)]
    Cpu,
    #[cfg(feature = "cuda")]
    #[default]
    Cuda,
}

/// ONNX Runtime session wrapping an exported classifier.
///
/// The model is expected to take a single `[1, H, W, 1]` float input and
/// produce a single `[1, num_classes]` probability output.
pub struct OrtBackend {
    session: Session,
    output_len: Option<usize>,
}

impl OrtBackend {
    /// Load model with specified execution provider
    pub fn load_model_with_provider(
        path: &Path,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        #[allow(unused_mut)]
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?;

        match provider {
            ExecutionProvider::Cpu => {
                tracing::info!(
                    intra_threads,
                    "Initializing ONNX Runtime with CPU execution provider"
                );
            }
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => {
                tracing::info!(
                    intra_threads,
                    "Initializing ONNX Runtime with CUDA execution provider"
                );
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
        }

        let session = builder.commit_from_file(path)?;

        let output_len = session
            .outputs()
            .first()
            .and_then(|output| output.dtype().tensor_shape())
            .and_then(|shape| class_dimension(shape));
        if output_len.is_none() {
            tracing::debug!(path = %path.display(), "Model output width is dynamic");
        }

        tracing::info!(path = %path.display(), ?output_len, "Model loaded");
        Ok(Self {
            session,
            output_len,
        })
    }
}

/// Width of a `[1, num_classes]` output; `None` when it is symbolic (-1).
fn class_dimension(shape: &[i64]) -> Option<usize> {
    shape
        .last()
        .and_then(|&dim| usize::try_from(dim).ok())
        .filter(|&dim| dim > 0)
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &Path, options: &BackendOptions) -> anyhow::Result<Self> {
        Self::load_model_with_provider(path, ExecutionProvider::default(), options.intra_threads)
    }

    fn infer(&mut self, input: &PreprocessedTensor) -> anyhow::Result<Vec<f32>> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view().into_dyn())?])?;

        let scores = outputs[0].try_extract_array::<f32>()?;

        Ok(scores.iter().copied().collect())
    }

    fn output_len(&self) -> Option<usize> {
        self.output_len
    }
}
