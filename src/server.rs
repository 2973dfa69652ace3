//! HTTP surface: `POST /predict-risk`, `GET /health`, `GET /metrics`

use crate::error::{InputError, ServiceError};
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::models::loader::ModelState;
use crate::types::request::{PredictRequest, Step};
use crate::types::response::RiskResponse;
use crate::types::risk::{RiskLevel, RiskLevelThresholds};
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared, read-only application state
pub struct AppState {
    pub model: ModelState,
    pub metrics: Arc<ServiceMetrics>,
    pub risk_levels: RiskLevelThresholds,
}

impl AppState {
    pub fn new(
        model: ModelState,
        metrics: Arc<ServiceMetrics>,
        risk_levels: RiskLevelThresholds,
    ) -> Self {
        Self {
            model,
            metrics,
            risk_levels,
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict-risk", post(predict_risk))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server; returns after Ctrl-C
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Readmission risk service listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}

/// Score one step of the admission wizard
pub async fn predict_risk(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RiskResponse>, ServiceError> {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4();

    match score(&state, &body) {
        Ok(response) => {
            let processing_time = start_time.elapsed();
            let risk_level = RiskLevel::from_score(response.risk_score, &state.risk_levels);
            state.metrics.record_prediction(
                response.step,
                processing_time,
                response.risk_score,
                risk_level,
            );

            info!(
                request_id = %request_id,
                step = response.step,
                risk_score = response.risk_score,
                risk_level = risk_level.as_str(),
                processing_time_us = processing_time.as_micros() as u64,
                "Risk score computed"
            );
            Ok(Json(response))
        }
        Err(e) => {
            state.metrics.record_failure(e.kind());
            match &e {
                ServiceError::MalformedInput(_) => {
                    warn!(request_id = %request_id, error = %e, "Rejected risk request")
                }
                _ => error!(
                    request_id = %request_id,
                    kind = e.kind(),
                    error = %e,
                    "Risk prediction failed"
                ),
            }
            Err(e)
        }
    }
}

/// Model check, body parsing, assembly and inference, in that order
fn score(state: &AppState, body: &[u8]) -> Result<RiskResponse, ServiceError> {
    let model = match &state.model {
        ModelState::Ready(model) => model,
        ModelState::Unavailable { source, reason } => {
            return Err(ServiceError::ModelUnavailable {
                bundle: source.clone(),
                reason: reason.clone(),
            })
        }
    };

    let request: PredictRequest =
        serde_json::from_slice(body).map_err(|e| InputError::InvalidBody(e.to_string()))?;
    let step = Step::try_from(request.step)?;

    let vector = model.assembler.assemble(step, &request.inputs)?;
    debug!(step = step.get(), features = ?vector.non_zero(), "Assembled feature vector");

    let prediction = model.engine.predict(vector.as_slice())?;

    Ok(RiskResponse {
        step: step.get(),
        risk_score: prediction.risk_score,
    })
}

/// Report whether the model is loaded
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match &state.model {
        ModelState::Ready(model) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "model": {
                    "kind": model.engine.model_kind(),
                    "features": model.engine.feature_count(),
                    "source": model.source.display().to_string(),
                    "format_version": model.format_version,
                    "loaded_at": model.loaded_at.to_rfc3339(),
                }
            })),
        ),
        ModelState::Unavailable { reason, .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "version": env!("CARGO_PKG_VERSION"),
                "reason": reason,
            })),
        ),
    }
}

/// Current metrics snapshot
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
