use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution state of the canonical user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStatus {
    Loading,
    Active,
    /// Awaiting activation or not assigned to a tenant.
    Pending,
    /// Tenant exists but is disabled.
    Inactive,
    /// Bootstrap failed; a retry may be pending.
    Error,
}

impl BootstrapStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapStatus::Loading => "loading",
            BootstrapStatus::Active => "active",
            BootstrapStatus::Pending => "pending",
            BootstrapStatus::Inactive => "inactive",
            BootstrapStatus::Error => "error",
        }
    }
}

impl fmt::Display for BootstrapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, tenant-scoped user record.
///
/// Replaced rather than mutated whenever bootstrap resolves; `id` and
/// `email` are stable for one session generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: String,
    pub tenant_id: Option<String>,
    pub tenant_display_name: Option<String>,
    /// Opaque key downstream systems use to address the tenant's data store.
    pub tenant_routing_key: Option<String>,
    pub display_name: String,
    pub bootstrap_status: BootstrapStatus,
    /// Last successful resolution.
    pub validated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn has_tenant(&self) -> bool {
        self.tenant_id.is_some()
    }

    /// Same record with a new status.
    pub fn with_status(&self, status: BootstrapStatus) -> Self {
        Self {
            bootstrap_status: status,
            ..self.clone()
        }
    }

    /// Same record with tenant fields cleared.
    pub fn without_tenant(&self, status: BootstrapStatus) -> Self {
        Self {
            tenant_id: None,
            tenant_display_name: None,
            tenant_routing_key: None,
            bootstrap_status: status,
            ..self.clone()
        }
    }
}
