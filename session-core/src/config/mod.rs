use crate::bootstrap::RetrySchedule;
use crate::error::AuthError;
use config::{Config as Cfg, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapSettings {
    /// Tenant-enrichment endpoint (POST, bearer token).
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    /// Per-attempt timeouts, in order.
    #[serde(default = "default_attempt_timeouts_ms")]
    pub attempt_timeouts_ms: Vec<u64>,
    /// Pause between a failed attempt and the next one.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Delay before a fresh schedule is started after exhaustion.
    #[serde(default = "default_error_retry_delay_ms")]
    pub error_retry_delay_ms: u64,
}

fn default_endpoint_url() -> String {
    "http://localhost:8080/v1/bootstrap".to_string()
}

fn default_attempt_timeouts_ms() -> Vec<u64> {
    vec![2_000, 4_000, 8_000, 16_000]
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_error_retry_delay_ms() -> u64 {
    10_000
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            attempt_timeouts_ms: default_attempt_timeouts_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            error_retry_delay_ms: default_error_retry_delay_ms(),
        }
    }
}

impl BootstrapSettings {
    /// Configured schedule; an empty list falls back to the default.
    pub fn retry_schedule(&self) -> RetrySchedule {
        if self.attempt_timeouts_ms.is_empty() {
            tracing::warn!("Empty bootstrap attempt schedule configured, using default");
            return RetrySchedule::default();
        }
        RetrySchedule::from_millis(&self.attempt_timeouts_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn error_retry_delay(&self) -> Duration {
        Duration::from_millis(self.error_retry_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP collector; spans are only exported when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_service_name() -> String {
    "session-core".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

impl Settings {
    /// Load from an optional `configuration` file and `APP__` environment
    /// variables (e.g. `APP__BOOTSTRAP__ENDPOINT_URL`).
    pub fn load() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// `APP__`-prefixed environment source; the timeout list is comma separated.
pub fn environment() -> Environment {
    Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("bootstrap.attempt_timeouts_ms")
}
