//! Readmission Risk Service - Main Entry Point
//!
//! Loads the model bundle once, then serves `POST /predict-risk` until Ctrl-C.

use anyhow::Result;
use readmission_risk::{
    config::{AppConfig, LogFormat},
    metrics::{MetricsReporter, ServiceMetrics},
    models::loader::ModelLoader,
    server::{self, AppState},
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("readmission_risk={}", config.logging.level).parse()?);
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    info!("Starting Readmission Risk Service");
    info!(
        "Risk levels: low<{:.1}%, moderate<{:.1}%, high>={:.1}%",
        config.risk_levels.moderate, config.risk_levels.high, config.risk_levels.high
    );

    // Load the model; a failure degrades the service instead of stopping it
    let model =
        ModelLoader::with_threads(config.model.onnx_threads).load(&config.model.bundle_path);
    if !model.is_ready() {
        warn!(
            path = %config.model.bundle_path.display(),
            "Serving without a model; every prediction will report the model as unavailable"
        );
    }

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = Arc::new(AppState::new(model, metrics.clone(), config.risk_levels.clone()));
    server::serve(&config.server.bind, state).await?;

    // Print final summary
    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
