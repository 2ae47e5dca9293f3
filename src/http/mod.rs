//! HTTP surface of the forecasting service.
//!
//! Thin axum layer: it parses the horizon from the path, calls the
//! [`ForecastService`](crate::service::ForecastService) and shapes JSON.
//! Malformed horizons are rejected here with a 400 before reaching the core.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
