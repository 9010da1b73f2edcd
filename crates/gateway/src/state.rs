use inference::{InferenceBackend, PredictionService};
use std::sync::Arc;

pub struct AppState<B: InferenceBackend> {
    pub service: Arc<PredictionService<B>>,
}

impl<B: InferenceBackend> AppState<B> {
    pub fn new(service: PredictionService<B>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

// derive(Clone) would demand B: Clone
impl<B: InferenceBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}
