mod common;

use common::{FakeIdentityProvider, ScriptedTransport, Step, harness, session, settle, wait_for};
use session_core::{AuthError, BootstrapStatus, ProviderError, SessionEvent, Visibility};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

fn provider_with_captain() -> Arc<FakeIdentityProvider> {
    let provider = FakeIdentityProvider::new();
    provider.register(
        "captain@fleet.io",
        "hunter2",
        session("u-1", "captain@fleet.io", "tok-1"),
    );
    provider
}

#[tokio::test(start_paused = true)]
async fn test_login_resolves_active_user() {
    let h = harness(provider_with_captain(), ScriptedTransport::active());
    h.orchestrator.start();

    let before = h.orchestrator.snapshot();
    assert!(!before.loading);
    assert!(before.user.is_none());

    assert_ok!(h.orchestrator.login("captain@fleet.io", "hunter2").await);

    let snapshot = wait_for(&h.orchestrator, |s| {
        s.status() == Some(BootstrapStatus::Active)
    })
    .await;
    let user = snapshot.user.unwrap();
    assert_eq!(user.id, "u-1");
    assert_eq!(user.role, "captain");
    assert_eq!(user.tenant_id.as_deref(), Some("T1"));
    assert_eq!(user.tenant_display_name.as_deref(), Some("Aurora"));
    assert!(user.validated_at.is_some());
    assert!(!snapshot.bootstrapping);
    assert!(snapshot.error.is_none());

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].token, "tok-1");
}

#[tokio::test(start_paused = true)]
async fn test_fast_path_user_is_published_before_bootstrap() {
    let gate = Arc::new(Notify::new());
    let transport = ScriptedTransport::new(vec![Step::Gate(gate.clone(), 200, common::ACTIVE_BODY)]);
    let h = harness(provider_with_captain(), transport);
    h.orchestrator.start();

    assert_ok!(h.orchestrator.login("captain@fleet.io", "hunter2").await);

    let snapshot = wait_for(&h.orchestrator, |s| s.user.is_some()).await;
    let user = snapshot.user.unwrap();
    assert_eq!(user.bootstrap_status, BootstrapStatus::Loading);
    assert_eq!(user.role, "member");
    assert_eq!(user.display_name, "captain");
    assert!(user.tenant_id.is_none());
    assert!(snapshot.bootstrapping);
    assert!(!snapshot.loading);

    gate.notify_one();
    wait_for(&h.orchestrator, |s| {
        s.status() == Some(BootstrapStatus::Active)
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_bad_password_returns_provider_error() {
    let h = harness(provider_with_captain(), ScriptedTransport::active());
    h.orchestrator.start();

    let err = assert_err!(h.orchestrator.login("captain@fleet.io", "wrong").await);
    assert!(matches!(
        err,
        AuthError::Provider(ProviderError::Rejected(_))
    ));
    assert_eq!(err.to_string(), "Invalid login credentials");

    settle().await;
    let snapshot = h.orchestrator.snapshot();
    assert!(snapshot.user.is_none());
    assert!(snapshot.session.is_none());
    assert!(snapshot.error.is_none());
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_before_start_is_rejected() {
    let h = harness(provider_with_captain(), ScriptedTransport::active());

    let err = assert_err!(h.orchestrator.login("captain@fleet.io", "hunter2").await);
    assert!(matches!(err, AuthError::NotStarted));
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_logout_clears_state() {
    let provider = FakeIdentityProvider::with_current(session("u-1", "captain@fleet.io", "tok-1"));
    let h = harness(provider, ScriptedTransport::active());
    h.orchestrator.start();
    wait_for(&h.orchestrator, |s| {
        s.status() == Some(BootstrapStatus::Active)
    })
    .await;

    h.orchestrator.logout().await;

    let snapshot = h.orchestrator.snapshot();
    assert!(snapshot.user.is_none());
    assert!(snapshot.session.is_none());
    assert!(!snapshot.loading);
    assert!(!snapshot.bootstrapping);
}

#[tokio::test(start_paused = true)]
async fn test_logout_clears_state_when_provider_fails() {
    let provider = FakeIdentityProvider::with_current(session("u-1", "captain@fleet.io", "tok-1"));
    provider.fail_sign_out(true);
    let h = harness(provider, ScriptedTransport::active());
    h.orchestrator.start();
    wait_for(&h.orchestrator, |s| {
        s.status() == Some(BootstrapStatus::Active)
    })
    .await;

    h.orchestrator.logout().await;

    let snapshot = h.orchestrator.snapshot();
    assert!(snapshot.user.is_none());
    assert!(snapshot.session.is_none());
    assert!(snapshot.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_sign_out_stays_signed_out_on_resume() {
    let provider = provider_with_captain();
    provider.set_current(Some(session("u-1", "captain@fleet.io", "tok-1")));
    provider.fail_sign_out(true);
    let h = harness(provider, ScriptedTransport::active());
    h.orchestrator.start();
    wait_for(&h.orchestrator, |s| {
        s.status() == Some(BootstrapStatus::Active)
    })
    .await;

    h.orchestrator.logout().await;
    h.orchestrator.on_visibility_change(Visibility::Visible);
    h.provider.emit(SessionEvent::token_refreshed(session(
        "u-1",
        "captain@fleet.io",
        "tok-2",
    )));
    settle().await;

    let snapshot = h.orchestrator.snapshot();
    assert!(snapshot.user.is_none());
    assert!(snapshot.session.is_none());
    assert_eq!(h.transport.call_count(), 1);

    assert_ok!(h.orchestrator.login("captain@fleet.io", "hunter2").await);
    wait_for(&h.orchestrator, |s| {
        s.status() == Some(BootstrapStatus::Active)
    })
    .await;
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_bootstrap_discards_the_call() {
    let gate = Arc::new(Notify::new());
    let transport = ScriptedTransport::new(vec![Step::Gate(gate.clone(), 200, common::ACTIVE_BODY)]);
    let provider = FakeIdentityProvider::with_current(session("u-1", "captain@fleet.io", "tok-1"));
    let h = harness(provider, transport);
    h.orchestrator.start();
    assert!(h.orchestrator.bootstrapping());

    h.orchestrator.logout().await;
    gate.notify_one();
    settle().await;
    tokio::time::sleep(std::time::Duration::from_secs(60)).await;

    let snapshot = h.orchestrator.snapshot();
    assert!(snapshot.user.is_none());
    assert!(!snapshot.bootstrapping);
    assert_eq!(h.transport.call_count(), 1);
}
