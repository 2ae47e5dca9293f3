//! Ridership Forecast Library
//!
//! Hourly and daily transit ridership forecasts backed by a pretrained
//! forecasting pipeline, with deterministic-shape mock fallbacks whenever the
//! model or its history is unavailable.

pub mod config;
pub mod http;
pub mod mock;
pub mod pipeline;
pub mod predictor;
pub mod series;
pub mod service;
pub mod traits;

// Re-export commonly used types
pub use config::AppConfig;
pub use mock::{HourBucket, MockPolicy, hourly_mock, hourly_target};
pub use pipeline::{
    AcquireError, ForecastPipeline, MockModelLoader, MockPipeline, ModelHandle, ModelLoader,
    PipelineError, RemoteModelLoader, RemotePipeline,
};
pub use predictor::{
    FallbackReason, Granularity, PredictError, Prediction, PredictionSource, Predictor,
};
pub use series::{
    CsvDataLoader, DataLoader, LoadError, MockDataLoader, TimeSeries, ValueColumn,
    parse_timestamp,
};
pub use service::ForecastService;
pub use traits::{Clock, MockClock, SystemClock};
