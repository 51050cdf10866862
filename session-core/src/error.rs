use crate::bootstrap::BootstrapPayload;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the orchestrator's public operations.
///
/// Bootstrap failures never show up here; they are absorbed into the
/// snapshot's `bootstrap_status` and `error` fields.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity provider rejected the request. Displays the provider's
    /// own message so it can be shown to the user as-is.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Session orchestrator has not been started")]
    NotStarted,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Failures reported by an [`IdentityProvider`](crate::events::IdentityProvider).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Credentials or request rejected; the message comes from the provider.
    #[error("{0}")]
    Rejected(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single bootstrap transport round-trip.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    Network(String),
}

/// Classified outcome of a bootstrap attempt that did not resolve a tenant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("Bootstrap rejected the session token (401)")]
    TokenInvalid,

    /// `403`, with the body's payload when it parsed.
    #[error("Bootstrap denied access to any tenant (403)")]
    AccessDenied(Option<BootstrapPayload>),

    #[error("Bootstrap attempt timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("Bootstrap network error: {0}")]
    Network(String),

    #[error("Bootstrap endpoint returned status {0}")]
    Status(u16),

    #[error("Bootstrap response could not be parsed: {0}")]
    Malformed(String),

    #[error("Bootstrap attempt cancelled")]
    Cancelled,

    #[error("Bootstrap failed after {attempts} attempts{}", .last.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    RetriesExhausted {
        attempts: usize,
        last: Option<Box<BootstrapError>>,
    },
}

impl BootstrapError {
    /// Whether the next entry of the retry schedule should be tried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BootstrapError::Timeout { .. }
                | BootstrapError::Network(_)
                | BootstrapError::Status(_)
                | BootstrapError::Malformed(_)
        )
    }
}

/// Failures while installing the tracing pipeline.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to initialize OTLP tracer: {0}")]
    Exporter(#[from] opentelemetry::trace::TraceError),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
