//! Decision tree and forest classifiers evaluated natively

use crate::error::InferenceError;
use crate::models::inference::RiskModel;
use serde::{Deserialize, Deserializer, Serialize};

/// Index of the readmitted class in leaf distributions
pub const POSITIVE_CLASS: usize = 1;

/// A node of a fitted tree.
///
/// Rows go left when `row[feature] <= threshold`. Leaves hold per-class
/// weights (counts or fractions); they are normalized at prediction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// A single fitted decision tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Number of input features seen at fit time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_features: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_classes: Option<usize>,

    /// Per-feature monotonicity constraints (-1, 0, 1).
    ///
    /// Outer `None`: the attribute is missing (older exporters).
    /// `Some(None)`: present and unconstrained.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub monotonic_cst: Option<Option<Vec<i8>>>,

    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Walk from the root to the leaf reached by `row`
    pub fn leaf_for(&self, row: &[f64]) -> Result<&[f64], InferenceError> {
        let mut index = 0;
        // Bounded walk: a well-formed tree never revisits a node
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return Ok(value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = row.get(*feature).ok_or_else(|| {
                        InferenceError::MalformedEstimator(format!(
                            "split on feature {} but row has {} values",
                            feature,
                            row.len()
                        ))
                    })?;
                    index = if *x <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(InferenceError::MalformedEstimator(format!(
                        "node {} does not exist",
                        index
                    )))
                }
            }
        }

        Err(InferenceError::MalformedEstimator(
            "tree traversal did not reach a leaf".to_string(),
        ))
    }

    /// Normalized class distribution for `row`
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError> {
        normalize_distribution(self.leaf_for(row)?)
    }
}

impl RiskModel for DecisionTree {
    fn kind(&self) -> &'static str {
        "decision_tree"
    }

    fn positive_probability(&self, row: &[f64]) -> Result<f64, InferenceError> {
        positive_class(&self.predict_proba(row)?)
    }
}

/// Bagged ensemble of trees (random forest, extra trees).
///
/// The class distribution is the mean of the per-tree distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_features: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_classes: Option<usize>,

    pub estimators: Vec<DecisionTree>,
}

impl Forest {
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if self.estimators.is_empty() {
            return Err(InferenceError::MalformedEstimator(
                "forest has no estimators".to_string(),
            ));
        }

        let mut total: Vec<f64> = Vec::new();
        for tree in &self.estimators {
            let proba = tree.predict_proba(row)?;
            if total.is_empty() {
                total = vec![0.0; proba.len()];
            }
            if proba.len() != total.len() {
                return Err(InferenceError::MalformedEstimator(format!(
                    "estimators disagree on class count ({} vs {})",
                    proba.len(),
                    total.len()
                )));
            }
            for (acc, p) in total.iter_mut().zip(proba) {
                *acc += p;
            }
        }

        let n = self.estimators.len() as f64;
        Ok(total.into_iter().map(|p| p / n).collect())
    }
}

impl RiskModel for Forest {
    fn kind(&self) -> &'static str {
        "random_forest"
    }

    fn positive_probability(&self, row: &[f64]) -> Result<f64, InferenceError> {
        positive_class(&self.predict_proba(row)?)
    }
}

fn normalize_distribution(weights: &[f64]) -> Result<Vec<f64>, InferenceError> {
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(InferenceError::MalformedEstimator(format!(
            "leaf weights sum to {}",
            total
        )));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

fn positive_class(proba: &[f64]) -> Result<f64, InferenceError> {
    proba.get(POSITIVE_CLASS).copied().ok_or_else(|| {
        InferenceError::MalformedEstimator(format!(
            "expected at least 2 classes, got {}",
            proba.len()
        ))
    })
}

/// Distinguish an explicit `null` from a missing key
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
