use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Claims embedded in a provider session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionClaims {
    /// Subject (user id) issued by the identity provider.
    pub sub: String,
    #[serde(default)]
    pub email: String,
    /// Free-form metadata attached to the identity (role, display name, ...).
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl SessionClaims {
    pub fn new(sub: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            email: email.into(),
            user_metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }

    /// First non-empty string stored under any of `keys`.
    pub fn metadata_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.user_metadata.get(*key))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}

/// Opaque credential bundle owned by the identity provider.
///
/// Replaced wholesale on every provider event; tokens stay wrapped in
/// [`Secret`] so they never reach logs.
#[derive(Debug, Clone)]
pub struct Session {
    access_token: Secret<String>,
    refresh_token: Option<Secret<String>>,
    expires_at: DateTime<Utc>,
    claims: SessionClaims,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
        claims: SessionClaims,
    ) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: None,
            expires_at,
            claims,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token.into()));
        self
    }

    pub fn access_token(&self) -> &Secret<String> {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&Secret<String>> {
        self.refresh_token.as_ref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }

    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    /// Same subject and same expiry.
    pub fn same_identity(&self, other: &Session) -> bool {
        self.claims.sub == other.claims.sub && self.expires_at == other.expires_at
    }

    /// Same identity carrying the same access token, i.e. a redelivery.
    pub fn same_credentials(&self, other: &Session) -> bool {
        self.same_identity(other)
            && self.access_token.expose_secret() == other.access_token.expose_secret()
    }
}
