//! HTTP handlers for the REST API.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State, rejection::PathRejection},
};

use super::dto::{HealthResponse, PredictionResponse, SERVICE_NAME, ServiceDescriptor};
use super::error::AppError;
use super::state::AppState;
use crate::predictor::Granularity;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// GET /
pub async fn root() -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor::default())
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let models: BTreeMap<String, String> = [Granularity::Hourly, Granularity::Daily]
        .into_iter()
        .map(|g| {
            (
                g.name().to_string(),
                state.service.predictor(g).model_state().label().to_string(),
            )
        })
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: state.service.clock().now_local(),
        service: SERVICE_NAME.to_string(),
        models,
    })
}

/// GET /predict/hourly/{hours_future}
pub async fn predict_hourly(
    State(state): State<AppState>,
    horizon: Result<Path<u32>, PathRejection>,
) -> HandlerResult<PredictionResponse> {
    predict(state, Granularity::Hourly, horizon).await
}

/// GET /predict/daily/{days_future}
pub async fn predict_daily(
    State(state): State<AppState>,
    horizon: Result<Path<u32>, PathRejection>,
) -> HandlerResult<PredictionResponse> {
    predict(state, Granularity::Daily, horizon).await
}

async fn predict(
    state: AppState,
    granularity: Granularity,
    horizon: Result<Path<u32>, PathRejection>,
) -> HandlerResult<PredictionResponse> {
    let Path(horizon) = horizon.map_err(|rejection| {
        tracing::debug!(granularity = granularity.name(), error = %rejection, "Rejected horizon");
        AppError::BadRequest {
            details: rejection.body_text(),
        }
    })?;

    // Only a panic inside the predictor ends up in the error branch.
    let service = state.service.clone();
    let prediction = tokio::spawn(async move { service.predict(granularity, horizon).await })
        .await
        .map_err(|e| {
            tracing::error!(granularity = granularity.name(), horizon, error = %e, "Prediction task failed");
            AppError::Prediction {
                granularity,
                horizon,
                details: e.to_string(),
                timestamp: state.service.clock().now_local(),
            }
        })?;

    tracing::info!(
        granularity = granularity.name(),
        horizon,
        prediction = prediction.value,
        mock = prediction.is_mock(),
        "Served prediction"
    );

    let predictor = state.service.predictor(granularity);
    Ok(Json(PredictionResponse::new(
        granularity,
        horizon,
        &prediction,
        predictor.model_id(),
        state.service.clock().now_local(),
    )))
}
