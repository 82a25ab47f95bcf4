//! Service configuration.

use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use z_margin_engine::{EngineConfig, InsightThresholds, PricingTable};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/z-margin").
    pub data_dir: String,

    /// Service API key required by mutating endpoints.
    pub service_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Whether the periodic rebuild and insight tasks run.
    pub enable_scheduler: bool,

    /// Seconds between periodic aggregate rebuilds.
    pub aggregation_interval_seconds: u64,

    /// Seconds between periodic insight evaluations.
    pub insight_interval_seconds: u64,

    /// Engine configuration (currency, pricing, thresholds, ranges).
    pub engine: EngineConfig,
}

const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

impl ServiceConfig {
    /// Load configuration from environment variables and JSON config files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut engine = EngineConfig::default();
        if let Ok(currency) = std::env::var("REPORTING_CURRENCY") {
            engine.normalizer.reporting_currency = currency.trim().to_ascii_lowercase();
        }
        engine.default_range_days = env_or("DEFAULT_RANGE_DAYS", engine.default_range_days);
        engine.max_range_days = env_or("MAX_RANGE_DAYS", engine.max_range_days);
        if let Some(thresholds) =
            load_config_file::<InsightThresholds>("THRESHOLDS_FILE", "thresholds.json")
        {
            engine.thresholds = thresholds;
        }
        if let Some(pricing) = load_config_file::<PricingTable>("PRICING_FILE", "pricing.json") {
            engine.normalizer.pricing = pricing;
        }

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            service_api_key: std::env::var("SERVICE_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            enable_scheduler: env_or("ENABLE_SCHEDULER", defaults.enable_scheduler),
            aggregation_interval_seconds: env_or(
                "AGGREGATION_INTERVAL_SECONDS",
                defaults.aggregation_interval_seconds,
            ),
            insight_interval_seconds: env_or(
                "INSIGHT_INTERVAL_SECONDS",
                defaults.insight_interval_seconds,
            ),
            engine,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/z-margin".into(),
            service_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout_seconds: 30,
            enable_scheduler: true,
            aggregation_interval_seconds: 3600,
            insight_interval_seconds: 6 * 3600,
            engine: EngineConfig::default(),
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key = %key, value = %raw, "Ignoring unparsable environment variable");
            default
        }),
        Err(_) => default,
    }
}

/// Load a JSON config file named by `env_key`, or found at a conventional path.
///
/// The first readable path wins; `None` means every path failed.
fn load_config_file<T: DeserializeOwned>(env_key: &str, file_name: &str) -> Option<T> {
    let mut paths = Vec::new();
    if let Ok(path) = std::env::var(env_key) {
        paths.push(path);
    }
    paths.push(format!(".config/{file_name}"));
    paths.push(format!("z-margin/.config/{file_name}"));
    paths.push(format!("../.config/{file_name}"));

    for path in &paths {
        match load_json_file::<T>(path) {
            Ok(value) => {
                tracing::info!(path = %path, "Loaded configuration file");
                return Some(value);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path, error = %e, "Failed to load configuration file"),
        }
    }

    tracing::debug!(file = %file_name, "Configuration file not found, using defaults");
    None
}

/// Load a value from a JSON file.
fn load_json_file<T: DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Configuration file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
