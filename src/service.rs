//! The forecasting service: one predictor per granularity.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::pipeline::RemoteModelLoader;
use crate::predictor::{Granularity, Prediction, Predictor};
use crate::series::CsvDataLoader;
use crate::traits::Clock;

/// Owns the hourly and daily predictors. The two share nothing.
pub struct ForecastService {
    hourly: Predictor,
    daily: Predictor,
    clock: Arc<dyn Clock>,
}

impl ForecastService {
    pub fn new(hourly: Predictor, daily: Predictor, clock: Arc<dyn Clock>) -> Self {
        Self {
            hourly,
            daily,
            clock,
        }
    }

    /// Wire both predictors to the configured data files and inference server.
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let timeout = Duration::from_secs(config.model.inference_timeout_secs);

        let build = |granularity: Granularity| {
            let series = match granularity {
                Granularity::Hourly => &config.hourly,
                Granularity::Daily => &config.daily,
            };
            let model_loader = Arc::new(RemoteModelLoader::new(
                config.model.clone(),
                config.network.clone(),
                granularity.name(),
            ));
            let data_loader = Arc::new(CsvDataLoader::new(
                series.data_path.clone(),
                series.timestamp_column.clone(),
            ));
            Predictor::new(granularity, model_loader, data_loader, Arc::clone(&clock))
                .with_model_id(config.model.model_id.clone())
                .with_inference_timeout(timeout)
        };

        let hourly = build(Granularity::Hourly);
        let daily = build(Granularity::Daily);
        Self::new(hourly, daily, clock)
    }

    pub fn predictor(&self, granularity: Granularity) -> &Predictor {
        match granularity {
            Granularity::Hourly => &self.hourly,
            Granularity::Daily => &self.daily,
        }
    }

    pub async fn predict(&self, granularity: Granularity, horizon: u32) -> Prediction {
        self.predictor(granularity).predict(horizon).await
    }

    pub async fn predict_hourly(&self, hours: u32) -> Prediction {
        self.hourly.predict(hours).await
    }

    pub async fn predict_daily(&self, days: u32) -> Prediction {
        self.daily.predict(days).await
    }

    /// Load models and history for both granularities up front.
    pub async fn warm_up(&self) {
        tokio::join!(self.hourly.warm_up(), self.daily.warm_up());
        tracing::info!(
            hourly_model = self.hourly.model_state().label(),
            hourly_rows = self.hourly.series_len().unwrap_or(0),
            daily_model = self.daily.model_state().label(),
            daily_rows = self.daily.series_len().unwrap_or(0),
            "Forecast service warmed up"
        );
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
