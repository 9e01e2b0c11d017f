//! Service configuration
//!
//! Layered as defaults, then an optional `leafscan.{toml,yaml,json}` file in the
//! working directory, then environment variables (`MODEL_PATH`, `PORT`, ...).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use image_pipeline::Normalization;
use serde::{Deserialize, Serialize};
use upload_validator::{ValidationConfig, MAX_UPLOAD_BYTES};

/// Base name of the optional configuration file
const CONFIG_FILE: &str = "leafscan";

const DEFAULT_MODEL_PATH: &str = "model/model.tflite";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_RATE_LIMIT_REPLENISH_SECS: u64 = 1;
const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Model file (`.tflite` or `.onnx`)
    pub model_path: PathBuf,
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Upload size ceiling in bytes
    pub max_upload_bytes: usize,
    /// Pixel normalization the model was trained with
    pub preprocessing: Normalization,
    /// Optional cooperative deadline for the prediction pipeline
    #[serde(default)]
    pub predict_timeout_ms: Option<u64>,
    /// Log output format
    pub log_format: LogFormat,
    /// Install the Prometheus exporter and serve `/metrics`
    pub metrics_enabled: bool,
    /// Enable per-IP rate limiting
    pub rate_limit_enabled: bool,
    /// Seconds to replenish one request of quota
    pub rate_limit_replenish_secs: u64,
    /// Requests allowed in a burst
    pub rate_limit_burst: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            preprocessing: Normalization::default(),
            predict_timeout_ms: None,
            log_format: LogFormat::default(),
            metrics_enabled: true,
            rate_limit_enabled: false,
            rate_limit_replenish_secs: DEFAULT_RATE_LIMIT_REPLENISH_SECS,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

impl ServiceConfig {
    /// Load from the config file and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(Environment::default().try_parsing(true))
    }

    /// Load with an explicit set of environment variables instead of the process environment
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::build(Environment::default().source(Some(vars)).try_parsing(true))
    }

    fn build(env: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Config::builder()
            .set_default("model_path", DEFAULT_MODEL_PATH)?
            .set_default("host", defaults.host)?
            .set_default("port", defaults.port as i64)?
            .set_default("max_upload_bytes", defaults.max_upload_bytes as u64)?
            .set_default("preprocessing", defaults.preprocessing.as_str())?
            .set_default("log_format", "text")?
            .set_default("metrics_enabled", defaults.metrics_enabled)?
            .set_default("rate_limit_enabled", defaults.rate_limit_enabled)?
            .set_default("rate_limit_replenish_secs", defaults.rate_limit_replenish_secs)?
            .set_default("rate_limit_burst", defaults.rate_limit_burst as i64)?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    /// `host:port` bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upload validation rules
    pub fn validation(&self) -> ValidationConfig {
        ValidationConfig::with_max_bytes(self.max_upload_bytes)
    }

    /// Prediction deadline, if configured
    pub fn deadline(&self) -> Option<Duration> {
        self.predict_timeout_ms.map(Duration::from_millis)
    }
}
