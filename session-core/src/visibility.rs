//! Foreground-resume reconciliation.
//!
//! When the host regains visibility the held session may be stale: signed
//! out in another tab, refreshed elsewhere, or still waiting on a failed
//! bootstrap. [`reconcile`] compares the provider's local session with what
//! the orchestrator holds and picks the cheapest corrective action.

use crate::models::{BootstrapStatus, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone)]
pub enum ReconcileAction {
    /// Session is gone; drop the user without a loading phase.
    SignOut,
    /// Provider holds a different session; start a new generation.
    AcceptSession(Session),
    /// Same session, unresolved bootstrap; retry under the current epoch.
    Rebootstrap,
    Nothing,
}

/// Decide what a foreground resume should do.
///
/// `held` and `status` describe the orchestrator's view; `in_flight` is true
/// while a bootstrap call is running for the current epoch.
pub fn reconcile(
    current: Option<Session>,
    held: Option<&Session>,
    status: Option<BootstrapStatus>,
    in_flight: bool,
) -> ReconcileAction {
    let Some(current) = current else {
        return match held {
            Some(_) => ReconcileAction::SignOut,
            None => ReconcileAction::Nothing,
        };
    };

    match held {
        Some(held) if held.same_identity(&current) => match status {
            Some(BootstrapStatus::Error) => ReconcileAction::Rebootstrap,
            Some(BootstrapStatus::Loading) if !in_flight => ReconcileAction::Rebootstrap,
            _ => ReconcileAction::Nothing,
        },
        _ => ReconcileAction::AcceptSession(current),
    }
}
