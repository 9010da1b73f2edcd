use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use inference::{InferenceError, ServiceError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub error_type: &'static str,
}

#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    /// The request itself was malformed (missing field, bad JSON, ...).
    Request { status: StatusCode, detail: String },
    /// Anything unclassified. The detail is logged, never returned.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Service(e) => match e {
                ServiceError::UnsupportedFormat { .. }
                | ServiceError::ImageTooLarge { .. }
                | ServiceError::Preprocess(preprocess::PreprocessError::InvalidImage { .. }) => {
                    StatusCode::BAD_REQUEST
                }
                ServiceError::Preprocess(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ServiceError::Inference(InferenceError::ModelNotLoaded { .. }) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ServiceError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Request { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Service(e) => ErrorBody {
                detail: e.to_string(),
                error_type: e.error_type(),
            },
            ApiError::Request { detail, .. } => ErrorBody {
                detail: detail.clone(),
                error_type: "InvalidRequest",
            },
            ApiError::Internal(_) => ErrorBody {
                detail: "Internal server error".to_string(),
                error_type: "InternalError",
            },
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(detail) => tracing::error!(%detail, "Unhandled error"),
            ApiError::Service(e) if status.is_server_error() => tracing::error!(
                error = %e,
                error_type = e.error_type(),
                step = ?e.failed_step(),
                "Prediction request failed"
            ),
            ApiError::Service(e) => tracing::warn!(
                error = %e,
                error_type = e.error_type(),
                "Rejected prediction request"
            ),
            ApiError::Request { detail, .. } => tracing::warn!(%detail, "Malformed request"),
        }

        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference::ClassifierKind;
    use preprocess::{PreprocessError, PreprocessStep};

    fn service(e: impl Into<ServiceError>) -> ApiError {
        ApiError::Service(e.into())
    }

    #[test]
    fn status_codes_follow_the_error_taxonomy() {
        let cases = [
            (
                service(PreprocessError::InvalidImage {
                    reason: "bad".to_string(),
                    filename: None,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                service(ServiceError::ImageTooLarge { size: 10, max: 5 }),
                StatusCode::BAD_REQUEST,
            ),
            (
                service(PreprocessError::ProcessingFailed {
                    step: PreprocessStep::Resize,
                    reason: "bad".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                service(InferenceError::ModelNotLoaded {
                    kind: ClassifierKind::Digit,
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                service(InferenceError::PredictionFailed {
                    kind: ClassifierKind::Character,
                    reason: "bad".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Internal("join error".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{error:?}");
        }
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let body = ApiError::Internal("task 12 panicked at src/x.rs".to_string()).body();
        assert_eq!(body.detail, "Internal server error");
        assert_eq!(body.error_type, "InternalError");
    }

    #[test]
    fn prediction_failures_keep_backend_text() {
        let body = service(InferenceError::PredictionFailed {
            kind: ClassifierKind::Character,
            reason: "Got invalid dimensions for input".to_string(),
        })
        .body();
        assert!(body.detail.contains("Got invalid dimensions for input"));
        assert_eq!(body.error_type, "PredictionFailed");
    }
}
