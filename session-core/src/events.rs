//! Identity provider seam and the session event stream built on top of it.

use crate::error::ProviderError;
use crate::models::Session;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    InitialSession,
}

/// Session-changed notification from the identity provider.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}

impl SessionEvent {
    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            session: None,
        }
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self {
            kind: SessionEventKind::TokenRefreshed,
            session: Some(session),
        }
    }

    pub fn initial(session: Option<Session>) -> Self {
        Self {
            kind: SessionEventKind::InitialSession,
            session,
        }
    }
}

/// The identity/session provider consumed by the orchestrator.
///
/// Implementations own token issuance and refresh; this crate only reads
/// sessions and reacts to their events.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a subscriber. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent>;

    /// Locally cached session; must not hit the network.
    fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}

/// Fail-safe wrapper around an [`IdentityProvider`].
#[derive(Clone)]
pub struct SessionEventSource {
    provider: Arc<dyn IdentityProvider>,
}

impl SessionEventSource {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.provider.subscribe(),
        }
    }

    /// Current session, or `None` when the provider's check fails.
    ///
    /// A failing check is reported as signed out, never as a partial user.
    pub fn current_session(&self) -> Option<Session> {
        match self.provider.current_session() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed, treating as signed out");
                None
            }
        }
    }
}

/// Live subscription to provider events, delivered in order.
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once the provider drops its side.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.rx.close();
    }
}
