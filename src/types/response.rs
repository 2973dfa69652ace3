//! Response bodies returned by the risk endpoint

use serde::{Deserialize, Serialize};

/// Successful prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResponse {
    /// Step echoed from the request
    pub step: u8,

    /// Readmission probability as a percentage, rounded to 4 decimals
    pub risk_score: f64,
}

/// Failure body; `suggestion` is only present for actionable failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}
