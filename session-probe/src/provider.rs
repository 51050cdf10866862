//! Identity provider backed by one pre-issued access token.

use anyhow::Result;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::DateTime;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use session_core::{IdentityProvider, ProviderError, Session, SessionClaims, SessionEvent};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
pub struct JwtClaims {
    #[serde(flatten)]
    pub identity: SessionClaims,
    pub exp: i64,
}

/// Decode a JWT payload without verifying its signature.
///
/// The bootstrap endpoint verifies the token; the probe only needs the
/// subject, email and expiry to build a session.
pub fn decode_jwt_claims(token: &str) -> Result<JwtClaims> {
    let parts: Vec<&str> = token.split('.').collect();

    if parts.len() != 3 {
        return Err(anyhow::anyhow!("Invalid JWT format"));
    }

    let payload = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| anyhow::anyhow!("Failed to decode JWT payload: {}", e))?;

    let claims: JwtClaims = serde_json::from_slice(&payload)
        .map_err(|e| anyhow::anyhow!("Failed to parse JWT claims: {}", e))?;

    Ok(claims)
}

/// Holds a single session built from a configured token. Password sign-in
/// is unsupported; sign-out drops the session and notifies subscribers.
pub struct StaticTokenProvider {
    session: Mutex<Option<Session>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl StaticTokenProvider {
    pub fn from_token(token: &Secret<String>) -> Result<Self> {
        let claims = decode_jwt_claims(token.expose_secret())?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| anyhow::anyhow!("JWT exp {} is out of range", claims.exp))?;

        let session = Session::new(token.expose_secret().clone(), expires_at, claims.identity);
        Ok(Self {
            session: Mutex::new(Some(session)),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn notify(&self, event: SessionEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn sign_in_with_password(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<Session, ProviderError> {
        Err(ProviderError::Rejected(
            "Password sign-in is not available with a static token".to_string(),
        ))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.notify(SessionEvent::signed_out());
        Ok(())
    }
}
