//! ML model loading and inference components

pub mod bundle;
pub mod inference;
pub mod linear;
pub mod loader;
pub mod migrate;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod tree;

pub use bundle::{ModelBundle, ModelSpec};
pub use inference::{InferenceEngine, RiskModel};
pub use loader::{LoadedModel, ModelLoader, ModelState};
