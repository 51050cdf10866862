//! Owner of the canonical user record and its bootstrap status.
//!
//! ```text
//!            begin (new session, new epoch)
//!                      │
//!                      ▼
//!   ┌──────────────► Loading ──────────────┐
//!   │  refresh /        │                   │ exhausted / 401
//!   │  scheduled retry  │ 2xx / 403         ▼
//!   │                   ▼                 Error
//!   └── Active | Pending | Inactive         │
//!   └───────────────────────────────────────┘ scheduled retry
//! ```
//!
//! Outcomes are only accepted while `Loading`; everything else is left to
//! the orchestrator's epoch checks.

use crate::bootstrap::client::BootstrapOutcome;
use crate::bootstrap::status::{BootstrapPayload, RemoteStatus};
use crate::models::{BootstrapStatus, User};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// A status change applied to the canonical user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: BootstrapStatus,
    pub to: BootstrapStatus,
    /// Message for the snapshot's `error` field.
    pub error: Option<String>,
    /// Whether the orchestrator should arm the out-of-band retry timer.
    pub schedule_retry: bool,
}

#[derive(Debug, Default)]
pub struct BootstrapMachine {
    user: Option<User>,
}

impl BootstrapMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn status(&self) -> Option<BootstrapStatus> {
        self.user.as_ref().map(|u| u.bootstrap_status)
    }

    /// Start a new generation from a fast-path user.
    pub fn begin(&mut self, user: User) {
        self.user = Some(user.with_status(BootstrapStatus::Loading));
    }

    /// Re-enter `Loading` for the same generation, keeping every field.
    ///
    /// Returns `false` when there is no user to refresh.
    pub fn reenter_loading(&mut self) -> bool {
        match self.user.as_ref() {
            Some(user) => {
                self.user = Some(user.with_status(BootstrapStatus::Loading));
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.user = None;
    }

    /// Apply a bootstrap outcome; `None` if the machine is not `Loading` or
    /// the outcome carries no decision.
    pub fn apply(&mut self, outcome: &BootstrapOutcome, now: DateTime<Utc>) -> Option<Transition> {
        let current = self.user.as_ref()?;
        let from = current.bootstrap_status;

        if from != BootstrapStatus::Loading {
            debug!(status = %from, outcome = outcome.label(), "Ignoring bootstrap outcome outside Loading");
            return None;
        }

        let (next, error, schedule_retry) = match outcome {
            BootstrapOutcome::Cancelled => return None,
            BootstrapOutcome::Resolved(payload) => (resolve(current, payload, now), None, false),
            BootstrapOutcome::AccessDenied(payload) => {
                (deny(current, payload.as_ref(), now), None, false)
            }
            BootstrapOutcome::TokenInvalid => (
                current.with_status(BootstrapStatus::Error),
                Some("Session token was rejected; sign in again".to_string()),
                false,
            ),
            BootstrapOutcome::Exhausted(e) => (
                current.with_status(BootstrapStatus::Error),
                Some(e.to_string()),
                true,
            ),
        };

        let to = next.bootstrap_status;
        self.user = Some(next);

        Some(Transition {
            from,
            to,
            error,
            schedule_retry,
        })
    }
}

/// `403`: a disabled tenant is still reported as `Inactive` with its
/// details; anything else leaves the user unassigned.
fn deny(current: &User, payload: Option<&BootstrapPayload>, now: DateTime<Utc>) -> User {
    match payload {
        Some(payload) if payload.status == RemoteStatus::TenantInactive => {
            resolve(current, payload, now)
        }
        _ => current.without_tenant(BootstrapStatus::Pending),
    }
}

fn resolve(current: &User, payload: &BootstrapPayload, now: DateTime<Utc>) -> User {
    if let RemoteStatus::Unrecognized(raw) = &payload.status {
        warn!(status = %raw, user_id = %current.id, "Unrecognized bootstrap status, treating as pending");
    }

    let status = payload.status.bootstrap_status();
    let validated_at = if status == BootstrapStatus::Active {
        Some(now)
    } else {
        current.validated_at
    };

    User {
        id: current.id.clone(),
        email: current.email.clone(),
        role: payload.role.clone().unwrap_or_else(|| current.role.clone()),
        tenant_id: payload.tenant_id.clone(),
        tenant_display_name: payload.tenant_name.clone(),
        tenant_routing_key: payload.tenant_routing_key.clone(),
        display_name: payload
            .display_name
            .clone()
            .unwrap_or_else(|| current.display_name.clone()),
        bootstrap_status: status,
        validated_at,
    }
}
