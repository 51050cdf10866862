//! session-core: non-blocking session bootstrap and lifecycle management.
//!
//! Turns an identity-provider session into a tenant-scoped [`User`] without
//! blocking the caller, and keeps that record consistent across sign-in,
//! sign-out, token refresh and foreground resume.
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod fast_path;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod visibility;

pub use bootstrap::{
    BootstrapClient, BootstrapOutcome, BootstrapPayload, BootstrapTransport,
    HttpBootstrapTransport, RemoteStatus, RetrySchedule, TransportReply,
};
pub use clock::{Clock, TokioClock};
pub use error::{AuthError, BootstrapError, ProviderError, TransportError};
pub use events::{IdentityProvider, SessionEvent, SessionEventKind, SessionEventSource};
pub use models::{BootstrapStatus, Epoch, Session, SessionClaims, User};
pub use orchestrator::{AuthSnapshot, SessionOrchestrator, SessionOrchestratorBuilder};
pub use visibility::Visibility;

pub use secrecy;
pub use tokio;
pub use tracing;
