use crate::models::BootstrapStatus;
use serde::Deserialize;

/// Status string reported by the bootstrap endpoint, as a closed set.
///
/// Anything not listed lands in [`RemoteStatus::Unrecognized`], which maps
/// to `Pending` and never to `Active`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RemoteStatus {
    Active,
    Pending,
    PendingActivation,
    TenantInactive,
    Unrecognized(String),
}

impl From<&str> for RemoteStatus {
    fn from(raw: &str) -> Self {
        let trimmed = raw.trim();
        let is = |expected: &str| trimmed.eq_ignore_ascii_case(expected);

        if is("ACTIVE") {
            RemoteStatus::Active
        } else if is("PENDING") {
            RemoteStatus::Pending
        } else if is("PENDING_ACTIVATION") {
            RemoteStatus::PendingActivation
        } else if is("YACHT_INACTIVE") || is("TENANT_INACTIVE") || is("INACTIVE") {
            RemoteStatus::TenantInactive
        } else {
            RemoteStatus::Unrecognized(trimmed.to_string())
        }
    }
}

impl From<String> for RemoteStatus {
    fn from(raw: String) -> Self {
        RemoteStatus::from(raw.as_str())
    }
}

impl RemoteStatus {
    pub fn bootstrap_status(&self) -> BootstrapStatus {
        match self {
            RemoteStatus::Active => BootstrapStatus::Active,
            RemoteStatus::TenantInactive => BootstrapStatus::Inactive,
            RemoteStatus::Pending
            | RemoteStatus::PendingActivation
            | RemoteStatus::Unrecognized(_) => BootstrapStatus::Pending,
        }
    }
}

/// `200` body of the bootstrap endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BootstrapPayload {
    pub status: RemoteStatus,
    #[serde(default, alias = "yacht_id")]
    pub tenant_id: Option<String>,
    #[serde(default, alias = "yacht_name")]
    pub tenant_name: Option<String>,
    #[serde(default, alias = "tenant_key_alias")]
    pub tenant_routing_key: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl BootstrapPayload {
    pub fn with_status(status: RemoteStatus) -> Self {
        Self {
            status,
            tenant_id: None,
            tenant_name: None,
            tenant_routing_key: None,
            role: None,
            display_name: None,
        }
    }
}
