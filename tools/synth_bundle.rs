//! Synthetic Model Bundle Generator
//!
//! Writes a random forest over the readmission feature layout so the
//! service can be exercised without a trained model.
//!
//! Usage: synth-bundle [output] [trees] [depth] [--legacy]
//!
//! `--legacy` omits `format_version`, `n_features`, `n_classes` and
//! `monotonic_cst`, reproducing bundles from older exporters.

use rand::seq::SliceRandom;
use rand::Rng;
use readmission_risk::feature_assembler::READMISSION_FEATURES;
use readmission_risk::models::migrate::{self, CURRENT_FORMAT_VERSION};
use readmission_risk::models::tree::{DecisionTree, Forest, TreeNode};
use readmission_risk::models::{ModelBundle, ModelLoader, ModelSpec};
use std::path::Path;
use tracing::info;

/// Plausible split ranges per feature, indexed like `READMISSION_FEATURES`
const FEATURE_RANGES: [(f64, f64); 21] = [
    (18.0, 90.0),  // age_at_admission
    (0.5, 0.5),    // gender_M
    (1.0, 20.0),   // total_diagnoses
    (0.0, 60.0),   // chronicity_index
    (0.0, 365.0),  // days_since_last_adm
    (0.0, 10.0),   // total_procedures
    (0.0, 80.0),   // total_lab_tests
    (0.0, 40.0),   // unique_lab_tests
    (0.0, 4.0),    // drg_mortality
    (0.0, 4.0),    // drg_severity
    (0.0, 8.0),    // criticality_score
    (0.5, 0.5),    // admission_type_*
    (0.5, 0.5),
    (0.5, 0.5),    // discharge_location_*
    (0.5, 0.5),
    (0.5, 0.5),
    (0.5, 0.5),
    (0.5, 0.5),    // insurance_*
    (0.5, 0.5),
    (0.5, 0.5),
    (0.5, 0.5),
];

/// Random tree generator
struct TreeGenerator {
    rng: rand::rngs::ThreadRng,
    max_depth: usize,
}

impl TreeGenerator {
    fn new(max_depth: usize) -> Self {
        Self {
            rng: rand::thread_rng(),
            max_depth: max_depth.max(1),
        }
    }

    /// Generate one tree; children always follow their parent in `nodes`
    fn generate(&mut self, legacy: bool) -> DecisionTree {
        let mut nodes = Vec::new();
        self.grow(&mut nodes, 0);

        DecisionTree {
            n_features: (!legacy).then_some(READMISSION_FEATURES.len()),
            n_classes: (!legacy).then_some(2),
            monotonic_cst: (!legacy).then_some(None),
            nodes,
        }
    }

    fn grow(&mut self, nodes: &mut Vec<TreeNode>, depth: usize) -> usize {
        let index = nodes.len();

        if depth >= self.max_depth || (depth > 0 && self.rng.gen_bool(0.2)) {
            nodes.push(self.leaf());
            return index;
        }

        let feature = self.rng.gen_range(0..READMISSION_FEATURES.len());
        let (low, high) = FEATURE_RANGES[feature];
        let threshold = if low < high {
            (self.rng.gen_range(low..high) * 100.0).round() / 100.0
        } else {
            low
        };

        // Reserve the split slot, then fill in children once they exist
        nodes.push(TreeNode::Leaf { value: Vec::new() });
        let left = self.grow(nodes, depth + 1);
        let right = self.grow(nodes, depth + 1);
        nodes[index] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }

    /// Leaf holding class counts for a few hundred training samples
    fn leaf(&mut self) -> TreeNode {
        let samples = self.rng.gen_range(20..400) as f64;
        let readmitted_rate = *[0.05, 0.1, 0.2, 0.35, 0.5, 0.7]
            .choose(&mut self.rng)
            .unwrap_or(&0.2);
        let readmitted = (samples * readmitted_rate).round();
        TreeNode::Leaf {
            value: vec![samples - readmitted, readmitted],
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("synth_bundle=info".parse()?),
        )
        .init();

    info!("Starting Synthetic Bundle Generator");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let legacy = args.iter().any(|a| a == "--legacy");
    let positional: Vec<&str> = args
        .iter()
        .skip(1)
        .filter(|a| !a.starts_with("--"))
        .map(|s| s.as_str())
        .collect();
    let output = positional
        .first()
        .copied()
        .unwrap_or("models/readmission_bundle.json");
    let trees: usize = positional.get(1).and_then(|s| s.parse().ok()).unwrap_or(10);
    let depth: usize = positional.get(2).and_then(|s| s.parse().ok()).unwrap_or(4);

    info!(
        output = %output,
        trees = trees,
        depth = depth,
        legacy = legacy,
        "Configuration loaded"
    );

    let mut generator = TreeGenerator::new(depth);
    let estimators = (0..trees.max(1))
        .map(|_| generator.generate(legacy))
        .collect();

    let bundle = ModelBundle {
        format_version: (!legacy).then_some(CURRENT_FORMAT_VERSION),
        features: READMISSION_FEATURES.iter().map(|s| s.to_string()).collect(),
        model: ModelSpec::RandomForest(Forest {
            n_features: (!legacy).then_some(READMISSION_FEATURES.len()),
            n_classes: (!legacy).then_some(2),
            estimators,
        }),
    };

    // Refuse to write anything the service would reject
    migrate::validate(&migrate::normalize(bundle.clone()))?;

    let output = Path::new(output);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, bundle.to_json_pretty()?)?;

    // Round-trip through the real loader
    let model = ModelLoader::new().try_load(output)?;
    let baseline = model
        .engine
        .predict(&vec![0.0; model.features().len()])?;

    info!("╔══════════════════════════════════════════╗");
    info!("║         BUNDLE GENERATION COMPLETE       ║");
    info!("╠══════════════════════════════════════════╣");
    info!("║ Output:          {}", output.display());
    info!("║ Trees:           {:>10}              ║", trees.max(1));
    info!("║ Max depth:       {:>10}              ║", depth);
    info!("║ Legacy format:   {:>10}              ║", legacy);
    info!("║ Baseline score:  {:>9.4}%              ║", baseline.risk_score);
    info!("╚══════════════════════════════════════════╝");

    Ok(())
}
