//! Risk inference over assembled feature rows

use crate::error::InferenceError;
use tracing::debug;

/// A fitted binary classifier scoring readmission risk.
///
/// Implementations must be immutable during inference so a single instance
/// can serve concurrent requests.
pub trait RiskModel: Send + Sync {
    /// Estimator family, for logs and health reporting
    fn kind(&self) -> &'static str;

    /// Probability of the positive (readmitted) class for one row
    fn positive_probability(&self, row: &[f64]) -> Result<f64, InferenceError>;
}

/// Result of model inference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    /// Raw positive-class probability (0.0 - 1.0)
    pub probability: f64,
    /// Probability as a percentage, rounded to 4 decimals
    pub risk_score: f64,
}

/// Decimal places kept in `risk_score`
pub const RISK_SCORE_DECIMALS: i32 = 4;

/// Scale a probability to a percentage rounded to [`RISK_SCORE_DECIMALS`]
pub fn to_risk_score(probability: f64) -> f64 {
    let factor = 10f64.powi(RISK_SCORE_DECIMALS);
    (probability * 100.0 * factor).round() / factor
}

/// Wraps the loaded model and enforces the row width it was trained on
pub struct InferenceEngine {
    model: Box<dyn RiskModel>,
    n_features: usize,
}

impl InferenceEngine {
    pub fn new(model: Box<dyn RiskModel>, n_features: usize) -> Self {
        Self { model, n_features }
    }

    pub fn model_kind(&self) -> &'static str {
        self.model.kind()
    }

    pub fn feature_count(&self) -> usize {
        self.n_features
    }

    /// Run inference on a single feature row
    pub fn predict(&self, row: &[f64]) -> Result<PredictionResult, InferenceError> {
        if row.len() != self.n_features {
            return Err(InferenceError::WidthMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }

        if let Some(index) = row.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::NonFiniteInput { index });
        }

        let probability = self.model.positive_probability(row)?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(InferenceError::InvalidProbability(probability));
        }

        let risk_score = to_risk_score(probability);
        debug!(
            model = self.model.kind(),
            probability = probability,
            risk_score = risk_score,
            "Inference complete"
        );

        Ok(PredictionResult {
            probability,
            risk_score,
        })
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("model", &self.model.kind())
            .field("n_features", &self.n_features)
            .finish()
    }
}
