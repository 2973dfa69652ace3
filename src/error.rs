//! Error types for request handling and inference

use crate::types::response::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the raw request payload
#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    /// Body was not valid JSON or did not match `{ step, inputs }`
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("step must be between 1 and {max}, got {step}")]
    StepOutOfRange { step: i64, max: u8 },

    /// An arithmetic field carried something other than a JSON number
    #[error("field `{field}` must be numeric, got {found}")]
    NotNumeric { field: &'static str, found: String },

    /// A derived or raw value overflowed, e.g. a product past `f64::MAX`
    #[error("feature `{feature}` is not finite")]
    NotFinite { feature: String },
}

/// Failures raised by a model while scoring a row
#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("model expects {expected} features, got {got}")]
    WidthMismatch { expected: usize, got: usize },

    #[error("feature {index} is not finite")]
    NonFiniteInput { index: usize },

    #[error("malformed estimator: {0}")]
    MalformedEstimator(String),

    #[error("model produced an invalid probability: {0}")]
    InvalidProbability(f64),

    /// Error reported by an external runtime (ONNX)
    #[error("inference backend error: {0}")]
    Backend(String),
}

/// Everything that can go wrong serving `/predict-risk`
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Model not loaded. Please check model bundle compatibility.")]
    ModelUnavailable { bundle: PathBuf, reason: String },

    #[error(transparent)]
    MalformedInput(#[from] InputError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ServiceError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::ModelUnavailable { .. } => "model_unavailable",
            ServiceError::MalformedInput(_) => "malformed_input",
            ServiceError::Inference(_) => "inference",
        }
    }

    /// Remediation hint returned alongside the error, if any
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ServiceError::ModelUnavailable { bundle, reason } => Some(format!(
                "Regenerate or replace the model bundle at {} ({}), then restart the service",
                bundle.display(),
                reason
            )),
            _ => None,
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            suggestion: self.suggestion(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self.to_response_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_has_suggestion() {
        let err = ServiceError::ModelUnavailable {
            bundle: PathBuf::from("models/bundle.json"),
            reason: "file not found".to_string(),
        };

        let body = err.to_response_body();
        assert!(body.error.contains("Model not loaded"));
        let suggestion = body.suggestion.unwrap();
        assert!(suggestion.contains("models/bundle.json"));
        assert!(suggestion.contains("restart"));
        assert_eq!(err.kind(), "model_unavailable");
    }

    #[test]
    fn test_input_error_is_transparent() {
        let err: ServiceError = InputError::NotNumeric {
            field: "length_of_stay",
            found: "\"\"".to_string(),
        }
        .into();

        assert_eq!(
            err.to_string(),
            "field `length_of_stay` must be numeric, got \"\""
        );
        assert!(err.suggestion().is_none());
        assert_eq!(err.kind(), "malformed_input");
    }
}
