//! Post-load migration of model bundles across exporter versions.
//!
//! Older exporters omit attributes newer inference code expects on tree
//! estimators (`monotonic_cst`, `n_features`, `n_classes`). [`normalize`]
//! fills them with neutral defaults after deserialization; [`validate`]
//! then checks the structure is safe to traverse.

use crate::models::bundle::{ModelBundle, ModelSpec};
use crate::models::tree::{DecisionTree, Forest, TreeNode};
use anyhow::{bail, ensure, Context, Result};
use tracing::{debug, warn};

/// Format version written by the current exporter
pub const CURRENT_FORMAT_VERSION: u32 = 2;

/// Assumed when a bundle does not declare a version
pub const LEGACY_FORMAT_VERSION: u32 = 1;

/// Class count assumed when a tree does not record one
pub const DEFAULT_N_CLASSES: usize = 2;

/// Fill attributes missing from older bundles with neutral defaults.
///
/// Every tree reachable from the top-level model is visited: the model itself
/// when it is a tree, and every member of an ensemble.
pub fn normalize(mut bundle: ModelBundle) -> ModelBundle {
    let n_features = bundle.features.len();
    let declared = bundle.format_version.unwrap_or(LEGACY_FORMAT_VERSION);

    bundle.model = match bundle.model {
        ModelSpec::DecisionTree(tree) => {
            ModelSpec::DecisionTree(normalize_tree(tree, n_features, None))
        }
        ModelSpec::RandomForest(forest) => {
            ModelSpec::RandomForest(normalize_forest(forest, n_features))
        }
        other => other,
    };

    if declared != CURRENT_FORMAT_VERSION {
        debug!(
            from = declared,
            to = CURRENT_FORMAT_VERSION,
            "Migrated model bundle"
        );
    }
    bundle.format_version = Some(CURRENT_FORMAT_VERSION);
    bundle
}

fn normalize_forest(mut forest: Forest, n_features: usize) -> Forest {
    let n_features = *forest.n_features.get_or_insert(n_features);
    forest.n_classes.get_or_insert(DEFAULT_N_CLASSES);
    forest.estimators = forest
        .estimators
        .into_iter()
        .enumerate()
        .map(|(i, tree)| normalize_tree(tree, n_features, Some(i)))
        .collect();
    forest
}

fn normalize_tree(
    mut tree: DecisionTree,
    n_features: usize,
    position: Option<usize>,
) -> DecisionTree {
    let n_features = *tree.n_features.get_or_insert(n_features);
    tree.n_classes.get_or_insert(DEFAULT_N_CLASSES);

    tree.monotonic_cst = match tree.monotonic_cst.take() {
        None => Some(None),
        Some(Some(cst)) if cst.len() != n_features => {
            warn!(
                estimator = ?position,
                constraints = cst.len(),
                features = n_features,
                "Discarding monotonic constraints that do not match the feature count"
            );
            Some(None)
        }
        present => present,
    };

    tree
}

/// Check a normalized bundle is structurally sound
pub fn validate(bundle: &ModelBundle) -> Result<()> {
    let n_features = bundle.features.len();
    ensure!(n_features > 0, "bundle declares no features");

    match &bundle.model {
        ModelSpec::DecisionTree(tree) => {
            validate_tree(tree, n_features).context("invalid decision tree")?
        }
        ModelSpec::RandomForest(forest) => {
            ensure!(!forest.estimators.is_empty(), "forest has no estimators");
            if let Some(n) = forest.n_features {
                ensure!(
                    n == n_features,
                    "forest expects {} features but bundle declares {}",
                    n,
                    n_features
                );
            }
            for (i, tree) in forest.estimators.iter().enumerate() {
                validate_tree(tree, n_features)
                    .with_context(|| format!("invalid estimator {}", i))?;
            }
        }
        ModelSpec::LogisticRegression(model) => {
            ensure!(
                model.coef.len() == n_features,
                "logistic regression has {} coefficients but bundle declares {} features",
                model.coef.len(),
                n_features
            );
            ensure!(
                model.coef.iter().all(|c| c.is_finite()) && model.intercept.is_finite(),
                "logistic regression has non-finite parameters"
            );
        }
        ModelSpec::Onnx(spec) => {
            ensure!(
                !spec.path.as_os_str().is_empty(),
                "onnx model path is empty"
            );
        }
    }

    Ok(())
}

fn validate_tree(tree: &DecisionTree, n_features: usize) -> Result<()> {
    ensure!(
        tree.monotonic_cst.is_some(),
        "monotonic_cst missing; bundle was not normalized"
    );

    let expected = tree.n_features.unwrap_or(n_features);
    ensure!(
        expected == n_features,
        "tree expects {} features but bundle declares {}",
        expected,
        n_features
    );

    let n_classes = tree.n_classes.unwrap_or(DEFAULT_N_CLASSES);
    ensure!(n_classes >= 2, "tree has {} classes, need at least 2", n_classes);
    ensure!(!tree.nodes.is_empty(), "tree has no nodes");

    for (index, node) in tree.nodes.iter().enumerate() {
        match node {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                ensure!(
                    *feature < n_features,
                    "node {} splits on feature {} of {}",
                    index,
                    feature,
                    n_features
                );
                ensure!(
                    !threshold.is_nan(),
                    "node {} has a NaN threshold",
                    index
                );
                // Children always follow their parent, so traversal terminates
                for child in [*left, *right] {
                    if child <= index || child >= tree.nodes.len() {
                        bail!(
                            "node {} has child {} outside {}..{}",
                            index,
                            child,
                            index + 1,
                            tree.nodes.len()
                        );
                    }
                }
            }
            TreeNode::Leaf { value } => {
                ensure!(
                    value.len() == n_classes,
                    "leaf {} has {} class weights, expected {}",
                    index,
                    value.len(),
                    n_classes
                );
                ensure!(
                    value.iter().all(|w| w.is_finite() && *w >= 0.0),
                    "leaf {} has negative or non-finite weights",
                    index
                );
                ensure!(
                    value.iter().sum::<f64>() > 0.0,
                    "leaf {} has no weight",
                    index
                );
            }
        }
    }

    Ok(())
}
