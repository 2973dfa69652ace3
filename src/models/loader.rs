//! Model bundle loader
//!
//! Loading never fails outright: any problem is logged and reported as
//! [`ModelState::Unavailable`], which the endpoint surfaces on every request.

use crate::feature_assembler::{FeatureAssembler, FeatureOrder};
use crate::models::bundle::{ModelBundle, ModelSpec};
use crate::models::inference::{InferenceEngine, RiskModel};
use crate::models::migrate::{self, CURRENT_FORMAT_VERSION, LEGACY_FORMAT_VERSION};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// A ready-to-serve model and its feature layout
#[derive(Debug)]
pub struct LoadedModel {
    pub engine: InferenceEngine,
    pub assembler: FeatureAssembler,
    /// Where the bundle was read from
    pub source: PathBuf,
    /// Format version the bundle declared before migration
    pub format_version: u32,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedModel {
    pub fn features(&self) -> &FeatureOrder {
        self.assembler.order()
    }
}

/// Outcome of loading the model at startup
#[derive(Debug, Clone)]
pub enum ModelState {
    Ready(Arc<LoadedModel>),
    Unavailable { source: PathBuf, reason: String },
}

impl ModelState {
    pub fn ready(&self) -> Option<&Arc<LoadedModel>> {
        match self {
            ModelState::Ready(model) => Some(model),
            ModelState::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready().is_some()
    }
}

/// Loader for model bundles
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of ONNX threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a bundle, falling back to [`ModelState::Unavailable`] on any error
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ModelState {
        let path = path.as_ref();

        info!(
            version = env!("CARGO_PKG_VERSION"),
            bundle_format = CURRENT_FORMAT_VERSION,
            path = %path.display(),
            "Loading model bundle"
        );

        match self.try_load(path) {
            Ok(model) => {
                info!(
                    model = model.engine.model_kind(),
                    features = model.features().len(),
                    declared_format = model.format_version,
                    "Model loaded successfully"
                );
                ModelState::Ready(Arc::new(model))
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(path = %path.display(), error = %reason, "Failed to load model");
                ModelState::Unavailable {
                    source: path.to_path_buf(),
                    reason,
                }
            }
        }
    }

    /// Read, migrate and instantiate a bundle file
    pub fn try_load<P: AsRef<Path>>(&self, path: P) -> Result<LoadedModel> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model bundle {}", path.display()))?;
        let bundle = ModelBundle::from_json(&raw)?;
        self.from_bundle(bundle, path)
    }

    /// Migrate and instantiate an already-parsed bundle
    pub fn from_bundle(&self, bundle: ModelBundle, source: &Path) -> Result<LoadedModel> {
        let declared = bundle.format_version.unwrap_or(LEGACY_FORMAT_VERSION);
        let bundle = migrate::normalize(bundle);
        migrate::validate(&bundle)?;

        let order = Arc::new(FeatureOrder::new(bundle.features)?);
        let model = self.instantiate(bundle.model, source)?;

        Ok(LoadedModel {
            engine: InferenceEngine::new(model, order.len()),
            assembler: FeatureAssembler::new(order),
            source: source.to_path_buf(),
            format_version: declared,
            loaded_at: Utc::now(),
        })
    }

    fn instantiate(&self, spec: ModelSpec, source: &Path) -> Result<Box<dyn RiskModel>> {
        match spec {
            ModelSpec::DecisionTree(tree) => Ok(Box::new(tree)),
            ModelSpec::RandomForest(forest) => Ok(Box::new(forest)),
            ModelSpec::LogisticRegression(model) => Ok(Box::new(model)),
            ModelSpec::Onnx(onnx) => self.instantiate_onnx(&onnx.path, source),
        }
    }

    #[cfg(feature = "onnx")]
    fn instantiate_onnx(&self, path: &Path, source: &Path) -> Result<Box<dyn RiskModel>> {
        let base = source.parent().unwrap_or_else(|| Path::new("."));
        let model = crate::models::onnx::OnnxModel::load(base.join(path), self.onnx_threads)?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn instantiate_onnx(&self, path: &Path, _source: &Path) -> Result<Box<dyn RiskModel>> {
        anyhow::bail!(
            "bundle references ONNX model {} but the `onnx` feature is not enabled",
            path.display()
        )
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn legacy_bundle_json() -> String {
        json!({
            "features": ["age_at_admission", "gender_M"],
            "model": {
                "kind": "random_forest",
                "estimators": [
                    {
                        "nodes": [
                            { "feature": 0, "threshold": 60.0, "left": 1, "right": 2 },
                            { "value": [9.0, 1.0] },
                            { "value": [2.0, 8.0] }
                        ]
                    }
                ]
            }
        })
        .to_string()
    }

    #[test]
    fn test_load_legacy_bundle_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(legacy_bundle_json().as_bytes()).unwrap();

        let state = ModelLoader::new().load(file.path());
        let model = state.ready().expect("model should load");

        assert_eq!(model.format_version, LEGACY_FORMAT_VERSION);
        assert_eq!(model.features().len(), 2);
        assert_eq!(model.engine.model_kind(), "random_forest");

        let result = model.engine.predict(&[70.0, 1.0]).unwrap();
        assert_eq!(result.risk_score, 80.0);
    }

    #[test]
    fn test_shipped_bundle_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/readmission_bundle.json");
        let state = ModelLoader::new().load(&path);
        let model = state.ready().expect("shipped bundle should load");

        assert_eq!(model.format_version, LEGACY_FORMAT_VERSION);
        assert_eq!(
            model.features().len(),
            crate::feature_assembler::READMISSION_FEATURES.len()
        );
        let score = model
            .engine
            .predict(&vec![0.0; model.features().len()])
            .unwrap()
            .risk_score;
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let state = ModelLoader::new().load("/nonexistent/readmission_bundle.json");

        assert!(!state.is_ready());
        match state {
            ModelState::Unavailable { source, reason } => {
                assert_eq!(source, PathBuf::from("/nonexistent/readmission_bundle.json"));
                assert!(reason.contains("Failed to read model bundle"));
            }
            ModelState::Ready(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn test_corrupt_file_is_unavailable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();

        assert!(!ModelLoader::new().load(file.path()).is_ready());
    }

    #[test]
    fn test_structurally_invalid_bundle_is_unavailable() {
        let bundle: ModelBundle = serde_json::from_value(json!({
            "features": ["a"],
            "model": {
                "kind": "decision_tree",
                "nodes": [{ "feature": 4, "threshold": 1.0, "left": 1, "right": 2 }]
            }
        }))
        .unwrap();

        assert!(ModelLoader::new()
            .from_bundle(bundle, Path::new("inline"))
            .is_err());
    }

    #[test]
    fn test_duplicate_features_rejected() {
        let bundle: ModelBundle = serde_json::from_value(json!({
            "features": ["a", "a"],
            "model": { "kind": "logistic_regression", "coef": [0.1, 0.2] }
        }))
        .unwrap();

        assert!(ModelLoader::new()
            .from_bundle(bundle, Path::new("inline"))
            .is_err());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_bundle_requires_feature() {
        let bundle: ModelBundle = serde_json::from_value(json!({
            "features": ["a"],
            "model": { "kind": "onnx", "path": "model.onnx" }
        }))
        .unwrap();

        let err = ModelLoader::new()
            .from_bundle(bundle, Path::new("models/bundle.json"))
            .unwrap_err();
        assert!(err.to_string().contains("`onnx` feature"));
    }
}
