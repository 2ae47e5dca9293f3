use std::path::PathBuf;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub network: NetworkConfig,
    pub hourly: SeriesConfig,
    pub daily: SeriesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Run both loaders at startup instead of on the first request.
    pub eager_load: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            eager_load: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_id: String,
    pub device: String,
    pub dtype: String,
    /// Base URL of the inference server. Unset means the forecasting
    /// dependency is not installed and every request is served by the mocks.
    pub inference_url: Option<String>,
    pub inference_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: "amazon/chronos-t5-mini".to_string(),
            device: "cpu".to_string(),
            dtype: "float32".to_string(),
            inference_url: None,
            inference_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Where a granularity's history lives.
#[derive(Debug, Deserialize, Clone)]
pub struct SeriesConfig {
    pub data_path: PathBuf,
    pub timestamp_column: String,
}

impl SeriesConfig {
    pub fn hourly_default() -> Self {
        Self {
            data_path: PathBuf::from(
                "data/MTA_Bus_Hourly_Ridership__Beginning_February_2022_1000.csv",
            ),
            timestamp_column: "transit_timestamp".to_string(),
        }
    }

    pub fn daily_default() -> Self {
        Self {
            data_path: PathBuf::from("data/MTA_Daily_Ridership_Data__Beginning_2020.csv"),
            timestamp_column: "Date".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            network: NetworkConfig::default(),
            hourly: SeriesConfig::hourly_default(),
            daily: SeriesConfig::daily_default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present - production uses env vars directly)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ridership-forecast");

        let hourly = SeriesConfig::hourly_default();
        let daily = SeriesConfig::daily_default();

        let builder = Config::builder()
            // 1. Defaults
            // Server
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5001)?
            .set_default("server.eager_load", false)?
            // Model
            .set_default("model.model_id", "amazon/chronos-t5-mini")?
            .set_default("model.device", "cpu")?
            .set_default("model.dtype", "float32")?
            .set_default("model.inference_url", None::<String>)?
            .set_default("model.inference_timeout_secs", 30)?
            // Network
            .set_default("network.request_timeout_secs", 30)?
            .set_default("network.connect_timeout_secs", 10)?
            // Series
            .set_default("hourly.data_path", hourly.data_path.to_string_lossy().to_string())?
            .set_default("hourly.timestamp_column", hourly.timestamp_column)?
            .set_default("daily.data_path", daily.data_path.to_string_lossy().to_string())?
            .set_default("daily.timestamp_column", daily.timestamp_column)?

            // 2. Local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))

            // 3. User config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))

            // 4. Environment variables (RIDERSHIP__MODEL__INFERENCE_URL=...)
            .add_source(Environment::with_prefix("RIDERSHIP").separator("__"));

        let s = builder.build()?;
        Ok(s.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Default Value Tests ====================

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5001);
        assert!(!config.eager_load);
    }

    #[test]
    fn test_model_config_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.model_id, "amazon/chronos-t5-mini");
        assert_eq!(config.device, "cpu");
        assert_eq!(config.dtype, "float32");
        assert!(config.inference_url.is_none());
        assert_eq!(config.inference_timeout_secs, 30);
    }

    #[test]
    fn test_series_config_defaults() {
        let hourly = SeriesConfig::hourly_default();
        assert_eq!(hourly.timestamp_column, "transit_timestamp");
        assert!(hourly.data_path.ends_with("MTA_Bus_Hourly_Ridership__Beginning_February_2022_1000.csv"));

        let daily = SeriesConfig::daily_default();
        assert_eq!(daily.timestamp_column, "Date");
        assert!(daily.data_path.ends_with("MTA_Daily_Ridership_Data__Beginning_2020.csv"));
    }

    // ==================== Config Loading Tests ====================

    #[test]
    fn test_config_load_with_defaults() {
        let config = AppConfig::load().expect("Config should load");

        assert!(!config.model.model_id.is_empty());
        assert!(config.model.inference_timeout_secs > 0);
        assert!(config.network.request_timeout_secs >= config.network.connect_timeout_secs);
        assert!(!config.hourly.timestamp_column.is_empty());
        assert!(!config.daily.timestamp_column.is_empty());
    }

    // ==================== Environment Variable Override Tests ====================

    /// Helper to set and remove environment variables around a closure.
    fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        // SAFETY: Test environment; each test uses keys no other test reads.
        for (key, value) in vars {
            unsafe {
                std::env::set_var(key, value);
            }
        }
        let result = f();
        for (key, _) in vars {
            unsafe {
                std::env::remove_var(key);
            }
        }
        result
    }

    #[test]
    fn test_env_var_overrides_inference_url() {
        let vars = [(
            "RIDERSHIP__MODEL__INFERENCE_URL",
            "http://localhost:9000",
        )];

        let config = with_env_vars(&vars, || AppConfig::load().expect("Config should load"));

        assert_eq!(
            config.model.inference_url.as_deref(),
            Some("http://localhost:9000"),
            "Environment variable should override model.inference_url"
        );
    }

    #[test]
    fn test_env_var_overrides_daily_series() {
        let vars = [
            ("RIDERSHIP__DAILY__DATA_PATH", "/tmp/daily.csv"),
            ("RIDERSHIP__DAILY__TIMESTAMP_COLUMN", "day"),
        ];

        let config = with_env_vars(&vars, || AppConfig::load().expect("Config should load"));

        assert_eq!(config.daily.data_path, PathBuf::from("/tmp/daily.csv"));
        assert_eq!(config.daily.timestamp_column, "day");
    }
}
