//! Pretrained forecasting pipeline and its acquisition.
//!
//! The pipeline runs behind an inference server. Acquiring it means checking
//! that the server is configured and has the model; once acquired, each
//! forecast is a single request. Tests substitute their own
//! [`ForecastPipeline`] and [`ModelLoader`] implementations.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ModelConfig, NetworkConfig};

/// Why the pipeline could not be acquired.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("forecasting dependency is not available: {0}")]
    DependencyUnavailable(String),
    #[error("failed to acquire model '{model_id}': {reason}")]
    Acquisition { model_id: String, reason: String },
}

/// A failed forecast call.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("inference request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("inference server returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("forecast is empty")]
    EmptyForecast,
    #[error("forecast value {0} is not finite")]
    NonFinite(f64),
    #[error("{0}")]
    Other(String),
}

/// A pretrained model mapping a history and a horizon to a forecast.
#[async_trait]
pub trait ForecastPipeline: Send + Sync {
    /// Forecast `prediction_length` steps after `context`.
    ///
    /// Returns one point estimate per step; the last element is the value at
    /// the requested horizon.
    async fn forecast(
        &self,
        context: &[f64],
        prediction_length: usize,
    ) -> Result<Vec<f64>, PipelineError>;
}

/// Per-process model state for one granularity.
///
/// Moves from `Unloaded` to one of the other two states exactly once.
#[derive(Clone)]
pub enum ModelHandle {
    Unloaded,
    Unavailable,
    Loaded(Arc<dyn ForecastPipeline>),
}

impl ModelHandle {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelHandle::Loaded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelHandle::Unloaded => "unloaded",
            ModelHandle::Unavailable => "unavailable",
            ModelHandle::Loaded(_) => "loaded",
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelHandle::Unloaded => "Unloaded",
            ModelHandle::Unavailable => "Unavailable",
            ModelHandle::Loaded(_) => "Loaded(..)",
        })
    }
}

/// Produces the model handle for a granularity.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Acquire the pipeline. Never returns `ModelHandle::Unloaded`.
    async fn load(&self) -> ModelHandle;
}

#[derive(Debug, Serialize)]
struct ForecastRequest<'a> {
    model: &'a str,
    context: &'a [f64],
    prediction_length: usize,
    device: &'a str,
    dtype: &'a str,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    forecast: Vec<f64>,
}

/// Pipeline served by a remote inference server.
#[derive(Clone, Debug)]
pub struct RemotePipeline {
    client: reqwest::Client,
    base_url: String,
    model_id: String,
    device: String,
    dtype: String,
}

impl RemotePipeline {
    /// Check that the server knows the model and return a pipeline bound to it.
    pub async fn acquire(
        model: &ModelConfig,
        network: &NetworkConfig,
    ) -> Result<Self, AcquireError> {
        let base_url = model
            .inference_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                AcquireError::DependencyUnavailable("no inference_url configured".to_string())
            })?;

        let acquisition = |reason: String| AcquireError::Acquisition {
            model_id: model.model_id.clone(),
            reason,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network.request_timeout_secs))
            .connect_timeout(Duration::from_secs(network.connect_timeout_secs))
            .build()
            .map_err(|e| acquisition(format!("failed to create HTTP client: {e}")))?;

        let response = client
            .get(format!("{}/models/{}", base_url, model.model_id))
            .send()
            .await
            .map_err(|e| acquisition(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(acquisition(format!("model lookup returned status {status}")));
        }

        Ok(Self {
            client,
            base_url,
            model_id: model.model_id.clone(),
            device: model.device.clone(),
            dtype: model.dtype.clone(),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl ForecastPipeline for RemotePipeline {
    async fn forecast(
        &self,
        context: &[f64],
        prediction_length: usize,
    ) -> Result<Vec<f64>, PipelineError> {
        let body = ForecastRequest {
            model: &self.model_id,
            context,
            prediction_length,
            device: &self.device,
            dtype: &self.dtype,
        };

        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Status(status));
        }

        let data = response.json::<ForecastResponse>().await?;
        Ok(data.forecast)
    }
}

/// Loader that acquires a [`RemotePipeline`] from configuration.
#[derive(Debug, Clone)]
pub struct RemoteModelLoader {
    model: ModelConfig,
    network: NetworkConfig,
    label: &'static str,
}

impl RemoteModelLoader {
    pub fn new(model: ModelConfig, network: NetworkConfig, label: &'static str) -> Self {
        Self {
            model,
            network,
            label,
        }
    }
}

#[async_trait]
impl ModelLoader for RemoteModelLoader {
    async fn load(&self) -> ModelHandle {
        tracing::info!(granularity = self.label, model = %self.model.model_id, "Loading forecasting model");
        match RemotePipeline::acquire(&self.model, &self.network).await {
            Ok(pipeline) => {
                tracing::info!(granularity = self.label, model = %pipeline.model_id(), "Forecasting model loaded");
                ModelHandle::Loaded(Arc::new(pipeline))
            }
            Err(AcquireError::DependencyUnavailable(reason)) => {
                tracing::warn!(granularity = self.label, %reason, "Forecasting not available - using mock predictions");
                ModelHandle::Unavailable
            }
            Err(e) => {
                tracing::error!(granularity = self.label, error = %e, "Error loading forecasting model");
                ModelHandle::Unavailable
            }
        }
    }
}

// ==================== Test Doubles ====================

/// Longest forecast `MockPipeline` materializes; only the last step matters.
const MOCK_MAX_STEPS: usize = 64;

/// Scriptable pipeline for tests.
///
/// Answers every step with `value` (or a fixed forecast), optionally failing
/// a number of calls first, and records each request.
#[derive(Debug)]
pub struct MockPipeline {
    value: f64,
    forecast: Option<Vec<f64>>,
    failures_remaining: AtomicUsize,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_request: Mutex<Option<(Vec<f64>, usize)>>,
}

impl MockPipeline {
    /// Pipeline whose forecast is `value` at every step.
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            forecast: None,
            failures_remaining: AtomicUsize::new(0),
            delay: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Return exactly this forecast regardless of the requested length.
    pub fn with_forecast(mut self, forecast: Vec<f64>) -> Self {
        self.forecast = Some(forecast);
        self
    }

    /// Fail the next `count` calls before answering.
    pub fn failing_first(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Context and prediction length of the most recent call.
    pub fn last_request(&self) -> Option<(Vec<f64>, usize)> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ForecastPipeline for MockPipeline {
    async fn forecast(
        &self,
        context: &[f64],
        prediction_length: usize,
    ) -> Result<Vec<f64>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some((context.to_vec(), prediction_length));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(PipelineError::Other("scripted inference failure".to_string()));
        }

        Ok(self
            .forecast
            .clone()
            .unwrap_or_else(|| vec![self.value; prediction_length.min(MOCK_MAX_STEPS)]))
    }
}

/// Loader that hands out a fixed handle and counts invocations.
#[derive(Debug)]
pub struct MockModelLoader {
    handle: ModelHandle,
    calls: AtomicUsize,
}

impl MockModelLoader {
    pub fn loaded(pipeline: Arc<dyn ForecastPipeline>) -> Self {
        Self {
            handle: ModelHandle::Loaded(pipeline),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            handle: ModelHandle::Unavailable,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for MockModelLoader {
    async fn load(&self) -> ModelHandle {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.handle.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_config(url: Option<&str>) -> ModelConfig {
        ModelConfig {
            inference_url: url.map(str::to_string),
            ..ModelConfig::default()
        }
    }

    #[tokio::test]
    async fn test_acquire_without_url_is_dependency_unavailable() {
        let result = RemotePipeline::acquire(&model_config(None), &NetworkConfig::default()).await;
        assert!(matches!(result, Err(AcquireError::DependencyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_acquire_with_blank_url_is_dependency_unavailable() {
        let result =
            RemotePipeline::acquire(&model_config(Some("  ")), &NetworkConfig::default()).await;
        assert!(matches!(result, Err(AcquireError::DependencyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_loader_without_url_is_unavailable() {
        let loader = RemoteModelLoader::new(model_config(None), NetworkConfig::default(), "hourly");
        let handle = loader.load().await;
        assert!(matches!(handle, ModelHandle::Unavailable));
    }

    #[test]
    fn test_model_handle_labels() {
        assert_eq!(ModelHandle::Unloaded.label(), "unloaded");
        assert_eq!(ModelHandle::Unavailable.label(), "unavailable");
        assert!(!ModelHandle::Unavailable.is_loaded());
        assert_eq!(format!("{:?}", ModelHandle::Unloaded), "Unloaded");
    }

    #[tokio::test]
    async fn test_mock_pipeline_fails_then_recovers() {
        let pipeline = MockPipeline::constant(3.5).failing_first(1);

        assert!(pipeline.forecast(&[1.0, 2.0], 2).await.is_err());
        assert_eq!(pipeline.forecast(&[1.0, 2.0], 2).await.unwrap(), vec![3.5, 3.5]);
        assert_eq!(pipeline.call_count(), 2);
        assert_eq!(pipeline.last_request(), Some((vec![1.0, 2.0], 2)));
    }

    #[tokio::test]
    async fn test_mock_model_loader_counts_calls() {
        let loader = MockModelLoader::loaded(Arc::new(MockPipeline::constant(1.0)));
        assert!(loader.load().await.is_loaded());
        assert!(loader.load().await.is_loaded());
        assert_eq!(loader.call_count(), 2);
    }
}
