use secrecy::Secret;
use serde::Deserialize;
use session_core::config::{BootstrapSettings, TelemetrySettings, environment};

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub probe: ProbeSettings,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Deserialize, Clone)]
pub struct ProbeSettings {
    /// Provider-issued JWT whose session is bootstrapped.
    pub access_token: Secret<String>,
    /// Upper bound on how long to wait for a resolved status.
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
}

fn default_wait_secs() -> u64 {
    45
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path =
        std::env::current_dir().map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;

    // Works from the workspace root and from the crate directory.
    let configuration_directory = if base_path.ends_with("session-probe") {
        base_path.join("config")
    } else {
        base_path.join("session-probe").join("config")
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(environment().prefix_separator("_"))
        .build()?;

    settings.try_deserialize::<Settings>()
}
