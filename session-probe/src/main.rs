use chrono::{DateTime, Utc};
use dotenvy::dotenv;
use serde::Serialize;
use session_core::observability::init_tracing;
use session_core::{
    AuthSnapshot, BootstrapStatus, HttpBootstrapTransport, SessionOrchestrator, User,
};
use session_probe::config::get_configuration;
use session_probe::provider::StaticTokenProvider;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Serialize)]
struct ProbeReport {
    signed_in: bool,
    expires_at: Option<DateTime<Utc>>,
    bootstrapping: bool,
    error: Option<String>,
    user: Option<User>,
}

impl From<AuthSnapshot> for ProbeReport {
    fn from(snapshot: AuthSnapshot) -> Self {
        Self {
            signed_in: snapshot.is_signed_in(),
            expires_at: snapshot.session.as_ref().map(|s| s.expires_at()),
            bootstrapping: snapshot.bootstrapping,
            error: snapshot.error,
            user: snapshot.user,
        }
    }
}

fn settled(snapshot: &AuthSnapshot) -> bool {
    !snapshot.loading && snapshot.status() != Some(BootstrapStatus::Loading)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        &configuration.telemetry.service_name,
        &configuration.telemetry.log_level,
        configuration.telemetry.otlp_endpoint.as_deref(),
    )?;

    let provider = StaticTokenProvider::from_token(&configuration.probe.access_token)
        .map_err(|e| anyhow::anyhow!("Unusable access token (set APP_PROBE__ACCESS_TOKEN): {}", e))?;
    let transport = HttpBootstrapTransport::new(configuration.bootstrap.endpoint_url.clone());

    let orchestrator = SessionOrchestrator::new(
        Arc::new(provider),
        Arc::new(transport),
        &configuration.bootstrap,
    );

    info!(
        endpoint = %configuration.bootstrap.endpoint_url,
        wait_secs = configuration.probe.wait_secs,
        "Starting session probe"
    );
    orchestrator.start();

    let mut snapshots = orchestrator.watch();
    let wait = Duration::from_secs(configuration.probe.wait_secs);
    let snapshot = match tokio::time::timeout(wait, snapshots.wait_for(settled))
        .await
        .map(|r| r.map(|s| s.clone()))
    {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(_)) => orchestrator.snapshot(),
        Err(_) => {
            warn!(wait_secs = configuration.probe.wait_secs, "Bootstrap did not settle in time");
            orchestrator.snapshot()
        }
    };

    println!("{}", serde_json::to_string_pretty(&ProbeReport::from(snapshot))?);

    orchestrator.stop();
    Ok(())
}
