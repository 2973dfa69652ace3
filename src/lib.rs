//! Readmission Risk Service Library
//!
//! Scores 30-day hospital readmission risk for a multi-step admission form.
//! Each step of the form contributes more of the patient's record; the
//! assembled feature row is scored by a model loaded once at startup.

pub mod config;
pub mod error;
pub mod feature_assembler;
pub mod metrics;
pub mod models;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::ServiceError;
pub use feature_assembler::{FeatureAssembler, FeatureOrder};
pub use models::inference::InferenceEngine;
pub use models::loader::{ModelLoader, ModelState};
pub use types::{request::PredictRequest, response::RiskResponse};
