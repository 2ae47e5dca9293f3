//! Per-granularity predictor: the fallback state machine.
//!
//! On every call the predictor makes sure the model and the history have been
//! loaded (each exactly once per process), then either asks the model or falls
//! back to the granularity's mock policy. `predict` never fails: missing
//! model, missing data and per-call inference errors all end in a mock value.
//! An inference error only affects that call; the next call tries the model
//! again.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::mock::MockPolicy;
use crate::pipeline::{ForecastPipeline, ModelHandle, ModelLoader, PipelineError};
use crate::series::{DataLoader, NonNumeric, TimeSeries, ValueColumn};
use crate::traits::Clock;

pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Which vertical a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
}

impl Granularity {
    pub fn name(self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }

    /// Unit of the horizon, as used in response field names.
    pub fn unit(self) -> &'static str {
        match self {
            Granularity::Hourly => "hours",
            Granularity::Daily => "days",
        }
    }

    pub fn value_column(self) -> ValueColumn {
        match self {
            Granularity::Hourly => ValueColumn::Exact("ridership".to_string()),
            Granularity::Daily => {
                ValueColumn::ContainsAny(vec!["ridership".to_string(), "total".to_string()])
            }
        }
    }

    pub fn mock_policy(self) -> MockPolicy {
        match self {
            Granularity::Hourly => MockPolicy::hourly(),
            Granularity::Daily => MockPolicy::daily(),
        }
    }
}

/// Why a call was answered by the mock policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    ModelUnavailable,
    DataUnavailable,
    MissingColumn,
    InferenceFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionSource {
    Model,
    Mock(FallbackReason),
}

/// A ridership estimate and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub value: i64,
    pub source: PredictionSource,
}

impl Prediction {
    pub fn is_mock(&self) -> bool {
        matches!(self.source, PredictionSource::Mock(_))
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self.source {
            PredictionSource::Model => None,
            PredictionSource::Mock(reason) => Some(reason),
        }
    }
}

/// Failure of a single model-backed prediction.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("no value column matching {0:?}")]
    MissingColumn(ValueColumn),
    #[error("horizon {0} cannot be forecast")]
    InvalidHorizon(u32),
    #[error(transparent)]
    NonNumeric(#[from] NonNumeric),
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub struct Predictor {
    granularity: Granularity,
    model_id: String,
    inference_timeout: Duration,
    model_loader: Arc<dyn ModelLoader>,
    data_loader: Arc<dyn DataLoader>,
    clock: Arc<dyn Clock>,
    model: OnceCell<ModelHandle>,
    series: OnceCell<Arc<TimeSeries>>,
}

impl Predictor {
    pub fn new(
        granularity: Granularity,
        model_loader: Arc<dyn ModelLoader>,
        data_loader: Arc<dyn DataLoader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            granularity,
            model_id: crate::config::ModelConfig::default().model_id,
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
            model_loader,
            data_loader,
            clock,
            model: OnceCell::new(),
            series: OnceCell::new(),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Current model state; `Unloaded` until the first call or warm-up.
    pub fn model_state(&self) -> ModelHandle {
        self.model.get().cloned().unwrap_or(ModelHandle::Unloaded)
    }

    /// Number of history rows, or `None` before the history is loaded.
    pub fn series_len(&self) -> Option<usize> {
        self.series.get().map(|s| s.len())
    }

    /// Run both loaders now instead of on the first request.
    pub async fn warm_up(&self) {
        self.model_handle().await;
        self.history().await;
    }

    /// Estimate ridership `horizon` steps ahead.
    pub async fn predict(&self, horizon: u32) -> Prediction {
        let model = self.model_handle().await.clone();
        let series = self.history().await;

        let reason = match model {
            ModelHandle::Loaded(pipeline) if !series.is_empty() => {
                match self.infer(pipeline.as_ref(), &series, horizon).await {
                    Ok(value) => {
                        tracing::debug!(granularity = self.granularity.name(), horizon, value, "Model prediction");
                        return Prediction {
                            value,
                            source: PredictionSource::Model,
                        };
                    }
                    Err(PredictError::MissingColumn(rule)) => {
                        tracing::warn!(
                            granularity = self.granularity.name(),
                            ?rule,
                            "No ridership column found, using mock prediction"
                        );
                        FallbackReason::MissingColumn
                    }
                    Err(e) => {
                        tracing::error!(
                            granularity = self.granularity.name(),
                            horizon,
                            error = %e,
                            "Error in prediction, using mock prediction"
                        );
                        FallbackReason::InferenceFailed
                    }
                }
            }
            ModelHandle::Loaded(_) => FallbackReason::DataUnavailable,
            ModelHandle::Unavailable | ModelHandle::Unloaded => FallbackReason::ModelUnavailable,
        };

        Prediction {
            value: self.mock(horizon),
            source: PredictionSource::Mock(reason),
        }
    }

    async fn model_handle(&self) -> &ModelHandle {
        self.model
            .get_or_init(|| async {
                match self.model_loader.load().await {
                    // A loader must settle the state; treat a non-answer as unavailable.
                    ModelHandle::Unloaded => ModelHandle::Unavailable,
                    handle => handle,
                }
            })
            .await
    }

    async fn history(&self) -> Arc<TimeSeries> {
        self.series
            .get_or_init(|| async {
                let loader = Arc::clone(&self.data_loader);
                match tokio::task::spawn_blocking(move || loader.load()).await {
                    Ok(series) => Arc::new(series),
                    Err(e) => {
                        tracing::error!(
                            granularity = self.granularity.name(),
                            error = %e,
                            "Data loader aborted"
                        );
                        Arc::new(TimeSeries::empty())
                    }
                }
            })
            .await
            .clone()
    }

    async fn infer(
        &self,
        pipeline: &dyn ForecastPipeline,
        series: &TimeSeries,
        horizon: u32,
    ) -> Result<i64, PredictError> {
        let rule = self.granularity.value_column();
        let column = series
            .find_column(&rule)
            .ok_or(PredictError::MissingColumn(rule))?;

        if horizon == 0 {
            return Err(PredictError::InvalidHorizon(horizon));
        }

        let context = series.values(column)?;
        let forecast = tokio::time::timeout(
            self.inference_timeout,
            pipeline.forecast(&context, horizon as usize),
        )
        .await
        .map_err(|_| PredictError::Timeout(self.inference_timeout))??;

        let last = forecast
            .last()
            .copied()
            .ok_or(PipelineError::EmptyForecast)?;
        if !last.is_finite() {
            return Err(PipelineError::NonFinite(last).into());
        }

        Ok(last.trunc() as i64)
    }

    fn mock(&self, horizon: u32) -> i64 {
        let mut rng = rand::thread_rng();
        self.granularity
            .mock_policy()
            .generate(self.clock.now_local(), horizon, &mut rng)
    }
}
