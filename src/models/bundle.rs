//! Persisted model bundle format
//!
//! A bundle is a JSON document with two required entries: `features`, the
//! ordered feature names the model was trained on, and `model`, the fitted
//! estimator tagged by `kind`.

use crate::models::linear::LogisticRegression;
use crate::models::tree::{DecisionTree, Forest};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A serialized estimator, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    DecisionTree(DecisionTree),
    RandomForest(Forest),
    LogisticRegression(LogisticRegression),
    /// External ONNX graph; `path` is relative to the bundle file
    Onnx(OnnxSpec),
}

impl ModelSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelSpec::DecisionTree(_) => "decision_tree",
            ModelSpec::RandomForest(_) => "random_forest",
            ModelSpec::LogisticRegression(_) => "logistic_regression",
            ModelSpec::Onnx(_) => "onnx",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnnxSpec {
    pub path: PathBuf,
}

/// Model plus the feature layout it expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    /// Exporter format version; absent in the oldest bundles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<u32>,

    pub features: Vec<String>,

    pub model: ModelSpec,
}

impl ModelBundle {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse model bundle")
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize model bundle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_forest_bundle() {
        let raw = json!({
            "format_version": 2,
            "features": ["age_at_admission", "gender_M"],
            "model": {
                "kind": "random_forest",
                "estimators": [
                    {
                        "monotonic_cst": null,
                        "nodes": [
                            { "feature": 0, "threshold": 60.0, "left": 1, "right": 2 },
                            { "value": [9.0, 1.0] },
                            { "value": [5.0, 5.0] }
                        ]
                    }
                ]
            }
        })
        .to_string();

        let bundle = ModelBundle::from_json(&raw).unwrap();

        assert_eq!(bundle.format_version, Some(2));
        assert_eq!(bundle.features.len(), 2);
        match &bundle.model {
            ModelSpec::RandomForest(forest) => {
                assert_eq!(forest.estimators.len(), 1);
                assert_eq!(forest.estimators[0].monotonic_cst, Some(None));
            }
            other => panic!("unexpected model kind {}", other.kind()),
        }
    }

    #[test]
    fn test_legacy_tree_without_monotonic_cst() {
        let raw = json!({
            "features": ["a"],
            "model": { "kind": "decision_tree", "nodes": [{ "value": [1.0, 3.0] }] }
        })
        .to_string();

        let bundle = ModelBundle::from_json(&raw).unwrap();

        assert_eq!(bundle.format_version, None);
        match bundle.model {
            ModelSpec::DecisionTree(tree) => assert_eq!(tree.monotonic_cst, None),
            other => panic!("unexpected model kind {}", other.kind()),
        }
    }

    #[test]
    fn test_missing_features_is_error() {
        let raw = r#"{"model": {"kind": "logistic_regression", "coef": [1.0]}}"#;
        assert!(ModelBundle::from_json(raw).is_err());
    }

    #[test]
    fn test_unknown_kind_is_error() {
        let raw = r#"{"features": ["a"], "model": {"kind": "svm"}}"#;
        assert!(ModelBundle::from_json(raw).is_err());
    }
}
