//! Response bodies of the REST API.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::predictor::{FallbackReason, Granularity, Prediction, PredictionSource};

pub const SERVICE_NAME: &str = "tryp-transit-model-service";
pub const SERVICE_VERSION: &str = "v0.2";

/// `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub message: String,
    pub version: String,
    pub endpoints: Endpoints,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    pub health: String,
    pub hourly_prediction: String,
    pub daily_prediction: String,
}

impl Default for ServiceDescriptor {
    fn default() -> Self {
        Self {
            message: "Tryp Transit Model Service API".to_string(),
            version: SERVICE_VERSION.to_string(),
            endpoints: Endpoints {
                health: "/health".to_string(),
                hourly_prediction: "/predict/hourly/{hours_future}".to_string(),
                daily_prediction: "/predict/daily/{days_future}".to_string(),
            },
            status: "running".to_string(),
        }
    }
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: NaiveDateTime,
    pub service: String,
    /// Model state per granularity: `unloaded`, `unavailable` or `loaded`.
    pub models: BTreeMap<String, String>,
}

/// `GET /predict/hourly/{hours}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyPredictionResponse {
    pub prediction: i64,
    pub hours_future: u32,
    pub model_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    pub timestamp: NaiveDateTime,
}

/// `GET /predict/daily/{days}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPredictionResponse {
    pub prediction: i64,
    pub days_future: u32,
    pub model_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    pub timestamp: NaiveDateTime,
}

/// `model_type` value: the model id when it answered, `mock` otherwise.
pub fn model_type(prediction: &Prediction, model_id: &str) -> String {
    match prediction.source {
        PredictionSource::Model => model_id.to_string(),
        PredictionSource::Mock(_) => "mock".to_string(),
    }
}

/// Either response shape, chosen by granularity.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Hourly(HourlyPredictionResponse),
    Daily(DailyPredictionResponse),
}

impl PredictionResponse {
    pub fn new(
        granularity: Granularity,
        horizon: u32,
        prediction: &Prediction,
        model_id: &str,
        timestamp: NaiveDateTime,
    ) -> Self {
        let model_type = model_type(prediction, model_id);
        let fallback_reason = prediction.fallback_reason();
        match granularity {
            Granularity::Hourly => PredictionResponse::Hourly(HourlyPredictionResponse {
                prediction: prediction.value,
                hours_future: horizon,
                model_type,
                fallback_reason,
                timestamp,
            }),
            Granularity::Daily => PredictionResponse::Daily(DailyPredictionResponse {
                prediction: prediction.value,
                days_future: horizon,
                model_type,
                fallback_reason,
                timestamp,
            }),
        }
    }
}
