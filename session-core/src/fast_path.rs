//! Network-free construction of the initial user record.
//!
//! Runs synchronously the moment a session is accepted so the UI can render
//! before the tenant bootstrap has answered.

use crate::models::{BootstrapStatus, Session, User};

/// Role assumed until bootstrap says otherwise.
pub const DEFAULT_ROLE: &str = "member";

const ROLE_KEYS: &[&str] = &["role"];
const DISPLAY_NAME_KEYS: &[&str] = &["display_name", "full_name", "name"];

/// Minimal [`User`] built from the session's embedded claims.
///
/// Tenant fields stay empty and the status is [`BootstrapStatus::Loading`].
pub fn build_user(session: &Session) -> User {
    let claims = session.claims();

    let role = claims
        .metadata_str(ROLE_KEYS)
        .unwrap_or(DEFAULT_ROLE)
        .to_string();

    let display_name = claims
        .metadata_str(DISPLAY_NAME_KEYS)
        .map(str::to_string)
        .unwrap_or_else(|| email_local_part(&claims.email));

    User {
        id: claims.sub.clone(),
        email: claims.email.clone(),
        role,
        tenant_id: None,
        tenant_display_name: None,
        tenant_routing_key: None,
        display_name,
        bootstrap_status: BootstrapStatus::Loading,
        validated_at: None,
    }
}

fn email_local_part(email: &str) -> String {
    match email.split('@').next() {
        Some(local) if !local.is_empty() => local.to_string(),
        _ => "User".to_string(),
    }
}
