//! Type definitions for the readmission risk service

pub mod request;
pub mod response;
pub mod risk;

pub use request::{PredictRequest, Step};
pub use response::{ErrorResponse, RiskResponse};
pub use risk::{RiskLevel, RiskLevelThresholds};
