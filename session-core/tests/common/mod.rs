//! Shared fakes for session-core integration tests.
//!
//! Tests run on tokio's paused clock, so every wait below is driven by
//! auto-advance rather than wall-clock time.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use session_core::{
    AuthSnapshot, Clock, IdentityProvider, ProviderError, Session, SessionClaims, SessionEvent,
    SessionEventKind, SessionOrchestrator, TokioClock, TransportError, TransportReply,
    bootstrap::BootstrapTransport,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

pub const ACTIVE_BODY: &str =
    r#"{"status":"ACTIVE","yacht_id":"T1","yacht_name":"Aurora","role":"captain"}"#;
pub const PENDING_BODY: &str = r#"{"status":"PENDING"}"#;
pub const INACTIVE_BODY: &str = r#"{"status":"YACHT_INACTIVE","yacht_id":"T1"}"#;

/// Session for `sub` expiring an hour from now.
pub fn session(sub: &str, email: &str, token: &str) -> Session {
    Session::new(
        token,
        Utc::now() + chrono::Duration::hours(1),
        SessionClaims::new(sub, email),
    )
}

/// Wait until a published snapshot satisfies `pred`.
///
/// Panics with the last snapshot if it never does.
pub async fn wait_for(
    orchestrator: &SessionOrchestrator,
    pred: impl FnMut(&AuthSnapshot) -> bool,
) -> AuthSnapshot {
    let mut rx = orchestrator.watch();
    match tokio::time::timeout(Duration::from_secs(600), rx.wait_for(pred)).await {
        Ok(Ok(snapshot)) => snapshot.clone(),
        _ => panic!(
            "snapshot condition never reached; last: {:?}",
            orchestrator.snapshot()
        ),
    }
}

/// Let spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct ProviderState {
    accounts: HashMap<String, (String, Session)>,
    current: Option<Session>,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
    subscribe_count: usize,
    fail_current: bool,
    fail_sign_out: bool,
}

/// In-memory identity provider that emits events like a hosted one.
#[derive(Default)]
pub struct FakeIdentityProvider {
    state: Mutex<ProviderState>,
}

impl FakeIdentityProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Provider that already holds `session` when the orchestrator starts.
    pub fn with_current(session: Session) -> Arc<Self> {
        let provider = Self::new();
        provider.set_current(Some(session));
        provider
    }

    pub fn register(&self, email: &str, password: &str, session: Session) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(email.to_string(), (password.to_string(), session));
    }

    /// Update the local session and notify subscribers.
    pub fn emit(&self, event: SessionEvent) {
        let mut state = self.state.lock().unwrap();
        state.current = match event.kind {
            SessionEventKind::SignedOut => None,
            _ => event.session.clone(),
        };
        state
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Change the local session without notifying anyone, as another tab would.
    pub fn set_current(&self, session: Option<Session>) {
        self.state.lock().unwrap().current = session;
    }

    pub fn fail_current_session(&self, fail: bool) {
        self.state.lock().unwrap().fail_current = fail;
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.state.lock().unwrap().fail_sign_out = fail;
    }

    pub fn subscribe_count(&self) -> usize {
        self.state.lock().unwrap().subscribe_count
    }

    pub fn live_subscribers(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        state.subscribers.push(tx);
        state.subscribe_count += 1;
        rx
    }

    fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        let state = self.state.lock().unwrap();
        if state.fail_current {
            return Err(ProviderError::Unavailable("storage corrupted".into()));
        }
        Ok(state.current.clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let session = {
            let state = self.state.lock().unwrap();
            match state.accounts.get(email) {
                Some((expected, session)) if expected == password => session.clone(),
                _ => return Err(ProviderError::Rejected("Invalid login credentials".into())),
            }
        };
        self.emit(SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if self.state.lock().unwrap().fail_sign_out {
            return Err(ProviderError::Unavailable("network unreachable".into()));
        }
        self.emit(SessionEvent::signed_out());
        Ok(())
    }
}

/// One scripted answer of [`ScriptedTransport`].
pub enum Step {
    Reply(u16, &'static str),
    /// Never answers; the attempt ends by timeout or cancellation.
    Hang,
    /// Answers once the gate is notified.
    Gate(Arc<Notify>, u16, &'static str),
    Fail(&'static str),
    /// Panics inside the call.
    Panic,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub token: String,
    pub at: Instant,
}

/// Bootstrap transport that plays back [`Step`]s, then a fallback.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    fallback: Option<(u16, &'static str)>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_fallback(steps: Vec<Step>, status: u16, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            fallback: Some((status, body)),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Always answers `200` with [`ACTIVE_BODY`].
    pub fn active() -> Arc<Self> {
        Self::with_fallback(Vec::new(), 200, ACTIVE_BODY)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BootstrapTransport for ScriptedTransport {
    async fn post_bootstrap(&self, access_token: &str) -> Result<TransportReply, TransportError> {
        self.calls.lock().unwrap().push(Call {
            token: access_token.to_string(),
            at: Instant::now(),
        });

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(status, body)) => Ok(TransportReply::new(status, body)),
            Some(Step::Gate(gate, status, body)) => {
                gate.notified().await;
                Ok(TransportReply::new(status, body))
            }
            Some(Step::Fail(message)) => Err(TransportError::Network(message.to_string())),
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Panic) => panic!("transport exploded"),
            None => match self.fallback {
                Some((status, body)) => Ok(TransportReply::new(status, body)),
                None => std::future::pending().await,
            },
        }
    }
}

/// [`TokioClock`] that records every requested sleep.
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for RecordingClock {
    fn now(&self) -> chrono::DateTime<Utc> {
        TokioClock.now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.sleeps.lock().unwrap().push(duration);
        TokioClock.sleep(duration)
    }
}

pub struct Harness {
    pub provider: Arc<FakeIdentityProvider>,
    pub transport: Arc<ScriptedTransport>,
    pub clock: Arc<RecordingClock>,
    pub orchestrator: SessionOrchestrator,
}

/// Orchestrator with default settings wired to the fakes.
pub fn harness(provider: Arc<FakeIdentityProvider>, transport: Arc<ScriptedTransport>) -> Harness {
    let clock = RecordingClock::new();
    let orchestrator = SessionOrchestrator::builder(provider.clone(), transport.clone())
        .clock(clock.clone())
        .build();

    Harness {
        provider,
        transport,
        clock,
        orchestrator,
    }
}
