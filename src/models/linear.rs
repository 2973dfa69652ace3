//! Logistic regression classifier

use crate::error::InferenceError;
use crate::models::inference::RiskModel;
use serde::{Deserialize, Serialize};

/// Binary logistic regression over raw (unscaled) features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl LogisticRegression {
    pub fn decision_function(&self, row: &[f64]) -> Result<f64, InferenceError> {
        if row.len() != self.coef.len() {
            return Err(InferenceError::WidthMismatch {
                expected: self.coef.len(),
                got: row.len(),
            });
        }

        let dot: f64 = self.coef.iter().zip(row).map(|(w, x)| w * x).sum();
        Ok(dot + self.intercept)
    }
}

impl RiskModel for LogisticRegression {
    fn kind(&self) -> &'static str {
        "logistic_regression"
    }

    fn positive_probability(&self, row: &[f64]) -> Result<f64, InferenceError> {
        let z = self.decision_function(row)?;
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}
