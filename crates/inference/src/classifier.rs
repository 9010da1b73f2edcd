use crate::backend::InferenceBackend;
use crate::config::ClassifierConfig;
use crate::errors::InferenceError;
use crate::labels::{ClassLabelRegistry, ClassifierKind, LabelLoad};
use common::span;
use preprocess::PreprocessedTensor;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

/// Outcome of a load attempt that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelLoad {
    Loaded,
    /// No artifact at the path: expected before a model has been trained.
    NotFound,
}

/// Raw scores of one forward pass and the wall-clock time it took.
#[derive(Debug, Clone)]
pub struct Forward {
    pub probabilities: Vec<f32>,
    pub latency_ms: f64,
}

/// Sole owner of one classifier's model handle and label registry.
///
/// States: unloaded -> loaded (successful `load`) -> unloaded (`unload`).
/// The handle sits behind a mutex that `predict` holds for the whole
/// forward pass, so `load`/`unload` can never swap the model out from under
/// an in-flight prediction. They are still meant for startup and shutdown,
/// not request handlers.
pub struct ClassifierGateway<B: InferenceBackend> {
    config: ClassifierConfig,
    handle: Mutex<Option<B>>,
    loaded: AtomicBool,
    labels: RwLock<Arc<ClassLabelRegistry>>,
}

impl<B: InferenceBackend> ClassifierGateway<B> {
    /// Creates an unloaded gateway with the default labels for its kind.
    pub fn new(config: ClassifierConfig) -> Self {
        let labels = ClassLabelRegistry::defaults(config.kind);
        Self {
            config,
            handle: Mutex::new(None),
            loaded: AtomicBool::new(false),
            labels: RwLock::new(Arc::new(labels)),
        }
    }

    pub fn kind(&self) -> ClassifierKind {
        self.config.kind
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Loads the model at the configured path.
    pub fn load_configured(&self) -> Result<ModelLoad, InferenceError> {
        let path = self.config.model_path.clone();
        self.load(&path)
    }

    /// Loads the model at `path`, then the configured label file.
    ///
    /// A missing file is `Ok(ModelLoad::NotFound)` and leaves the gateway
    /// unloaded. A file that exists but cannot be loaded is an error.
    pub fn load(&self, path: &Path) -> Result<ModelLoad, InferenceError> {
        let kind = self.kind();
        tracing::info!(%kind, path = %path.display(), "Attempting to load model");

        match path.try_exists() {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%kind, path = %path.display(), "Model file not found");
                return Ok(ModelLoad::NotFound);
            }
            Err(e) => {
                tracing::error!(
                    %kind,
                    path = %path.display(),
                    error = %e,
                    "Cannot access model file"
                );
                return Err(InferenceError::ModelLoadFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }

        if let Ok(metadata) = path.metadata() {
            tracing::info!(
                %kind,
                size_mb = format!("{:.2}", metadata.len() as f64 / 1024.0 / 1024.0),
                "Model file size"
            );
        }

        let backend = B::load_model(path, &self.config.backend).map_err(|e| {
            tracing::error!(%kind, path = %path.display(), error = %e, "Failed to load model");
            InferenceError::ModelLoadFailed {
                path: path.to_path_buf(),
                reason: format!("{e:#}"),
            }
        })?;

        let output_len = backend.output_len();
        {
            let mut handle = self.lock_handle();
            *handle = Some(backend);
            self.loaded.store(true, Ordering::Release);
        }

        let labels_path = self.config.labels_path.clone();
        self.reload_labels(&labels_path);

        let labels = self.labels();
        let classes = labels.size();
        match output_len {
            Some(outputs) if outputs != classes => tracing::warn!(
                %kind,
                outputs,
                classes,
                "Model output size does not match the label count"
            ),
            _ => {}
        }

        tracing::info!(
            %kind,
            classes,
            labels = ?labels.source(),
            "Model loaded successfully"
        );
        Ok(ModelLoad::Loaded)
    }

    /// Re-reads the label file. Readers holding the previous snapshot keep it.
    pub fn reload_labels(&self, path: &Path) -> LabelLoad {
        let mut registry = ClassLabelRegistry::defaults(self.kind());
        let outcome = registry.load(path);

        match self.labels.write() {
            Ok(mut labels) => *labels = Arc::new(registry),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(registry),
        }

        outcome
    }

    /// Runs one forward pass. Fails with `ModelNotLoaded` rather than
    /// producing a degraded result.
    pub fn predict(&self, tensor: &PreprocessedTensor) -> Result<Forward, InferenceError> {
        let kind = self.kind();
        let mut handle = self.lock_handle();
        let backend = handle.as_mut().ok_or_else(|| {
            tracing::error!(%kind, "Prediction attempted without loaded model");
            InferenceError::ModelNotLoaded { kind }
        })?;

        tracing::debug!(%kind, shape = ?tensor.shape(), "Running forward pass");

        let start = Instant::now();
        let outcome = {
            let _s = span!("forward_pass");
            panic::catch_unwind(AssertUnwindSafe(|| backend.infer(tensor)))
        };
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let probabilities = match outcome {
            Ok(Ok(probabilities)) => probabilities,
            Ok(Err(e)) => {
                tracing::error!(%kind, error = %e, "Prediction failed");
                return Err(InferenceError::PredictionFailed {
                    kind,
                    reason: format!("{e:#}"),
                });
            }
            Err(_) => {
                tracing::error!(%kind, "Inference backend panicked");
                return Err(InferenceError::PredictionFailed {
                    kind,
                    reason: "inference backend panicked".to_string(),
                });
            }
        };

        if probabilities.is_empty() {
            return Err(InferenceError::PredictionFailed {
                kind,
                reason: "model returned no scores".to_string(),
            });
        }

        Ok(Forward {
            probabilities,
            latency_ms,
        })
    }

    /// Drops the model handle. Unloading twice is a no-op.
    pub fn unload(&self) {
        let mut handle = self.lock_handle();
        if handle.take().is_some() {
            tracing::info!(kind = %self.kind(), "Model unloaded");
        }
        self.loaded.store(false, Ordering::Release);
    }

    /// Snapshot of the current label registry.
    pub fn labels(&self) -> Arc<ClassLabelRegistry> {
        match self.labels.read() {
            Ok(labels) => Arc::clone(&labels),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn class_count(&self) -> usize {
        self.labels().size()
    }

    /// A panic is caught inside `predict` before the guard drops, so
    /// poisoning only follows a panic in `load`/`unload`; the `Option` is
    /// still consistent then.
    fn lock_handle(&self) -> MutexGuard<'_, Option<B>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
