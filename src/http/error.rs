//! HTTP error handling and response types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDateTime;
use serde_json::{Map, Value, json};

use crate::predictor::Granularity;

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Horizon path segment is not a non-negative integer.
    BadRequest { details: String },
    /// The prediction could not be produced at all.
    Prediction {
        granularity: Granularity,
        horizon: u32,
        details: String,
        timestamp: NaiveDateTime,
    },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest { details } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid horizon",
                    "details": details,
                })),
            )
                .into_response(),
            AppError::Prediction {
                granularity,
                horizon,
                details,
                timestamp,
            } => {
                let mut body = Map::new();
                body.insert(
                    "error".to_string(),
                    Value::from(format!("{} prediction failed", granularity.name())),
                );
                body.insert("details".to_string(), Value::from(details));
                body.insert(
                    format!("{}_requested", granularity.unit()),
                    Value::from(horizon),
                );
                body.insert(
                    "timestamp".to_string(),
                    Value::from(timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
                );
                (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Object(body))).into_response()
            }
        }
    }
}
