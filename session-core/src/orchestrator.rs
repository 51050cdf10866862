//! Session lifecycle orchestration.
//!
//! [`SessionOrchestrator`] composes the event source, fast path, bootstrap
//! client and state machine, and publishes one consistent
//! [`AuthSnapshot`] after every change.
//!
//! All mutable state sits in a single `State` behind a mutex that is never
//! held across an `.await`. Background work (bootstrap calls, retry timers,
//! listeners) only ever hands results back through handlers that first check
//! the lifecycle and the epoch/ticket the work was started under, so a
//! result from a superseded session or dispatch is dropped on arrival.

use crate::bootstrap::{
    BootstrapClient, BootstrapMachine, BootstrapOutcome, BootstrapTransport, RetrySchedule,
    TaggedOutcome,
};
use crate::clock::{Clock, TokioClock};
use crate::config::BootstrapSettings;
use crate::error::AuthError;
use crate::events::{
    EventSubscription, IdentityProvider, SessionEvent, SessionEventKind, SessionEventSource,
};
use crate::fast_path;
use crate::models::{BootstrapStatus, Epoch, Session, User};
use crate::visibility::{self, ReconcileAction, Visibility};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// The published authentication state.
#[derive(Debug, Clone)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub session: Option<Session>,
    /// True until the initial session check (and fast path) has run.
    pub loading: bool,
    /// True while a bootstrap call is in flight.
    pub bootstrapping: bool,
    pub error: Option<String>,
}

impl AuthSnapshot {
    fn initial() -> Self {
        Self {
            user: None,
            session: None,
            loading: true,
            bootstrapping: false,
            error: None,
        }
    }

    pub fn status(&self) -> Option<BootstrapStatus> {
        self.user.as_ref().map(|u| u.bootstrap_status)
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Identifies one dispatch (or retry timer) within an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    epoch: Epoch,
    seq: u64,
}

struct InFlight {
    ticket: Ticket,
    cancel: CancellationToken,
}

struct PendingRetry {
    ticket: Ticket,
    cancel: CancellationToken,
}

struct State {
    lifecycle: Lifecycle,
    epoch: Epoch,
    seq: u64,
    session: Option<Session>,
    machine: BootstrapMachine,
    loading: bool,
    error: Option<String>,
    in_flight: Option<InFlight>,
    pending_retry: Option<PendingRetry>,
    /// Set by `logout`. Until a fresh sign-in, whatever session the
    /// provider still reports is not ours.
    signed_out: bool,
    visibility: Option<watch::Receiver<Visibility>>,
    listeners: Vec<JoinHandle<()>>,
}

impl State {
    fn new(visibility: Option<watch::Receiver<Visibility>>) -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            epoch: Epoch::ZERO,
            seq: 0,
            session: None,
            machine: BootstrapMachine::new(),
            loading: true,
            error: None,
            in_flight: None,
            pending_retry: None,
            signed_out: false,
            visibility,
            listeners: Vec::new(),
        }
    }

    fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            user: self.machine.user().cloned(),
            session: self.session.clone(),
            loading: self.loading,
            bootstrapping: self.in_flight.is_some(),
            error: self.error.clone(),
        }
    }

    fn next_ticket(&mut self) -> Ticket {
        self.seq += 1;
        Ticket {
            epoch: self.epoch,
            seq: self.seq,
        }
    }

    /// Abort the in-flight call and disarm the retry timer.
    fn cancel_pending(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!(epoch = %in_flight.ticket.epoch, seq = in_flight.ticket.seq, "Cancelling in-flight bootstrap");
            in_flight.cancel.cancel();
        }
        if let Some(retry) = self.pending_retry.take() {
            retry.cancel.cancel();
        }
    }

    /// Cancel outstanding work and move to a fresh epoch.
    fn invalidate(&mut self) {
        self.cancel_pending();
        self.epoch = self.epoch.next();
    }
}

struct Shared {
    events: SessionEventSource,
    client: BootstrapClient,
    clock: Arc<dyn Clock>,
    error_retry_delay: Duration,
    shutdown: CancellationToken,
    state: Mutex<State>,
    snapshot_tx: watch::Sender<AuthSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    fn handle_event(self: &Arc<Self>, event: SessionEvent) {
        let mut state = self.lock();
        if state.lifecycle != Lifecycle::Running {
            return;
        }

        debug!(kind = ?event.kind, has_session = event.session.is_some(), "Session event received");

        if event.kind == SessionEventKind::SignedIn {
            state.signed_out = false;
        } else if state.signed_out {
            debug!(kind = ?event.kind, "Ignoring session event after local sign-out");
            return;
        }

        match (event.kind, event.session) {
            (SessionEventKind::SignedOut, _) | (_, None) => {
                self.clear_session(&mut state, "signed out");
            }
            (SessionEventKind::TokenRefreshed, Some(session))
                if state
                    .session
                    .as_ref()
                    .is_some_and(|held| held.subject() == session.subject()) =>
            {
                self.refresh_credentials(&mut state, session);
            }
            (_, Some(session))
                if state
                    .session
                    .as_ref()
                    .is_some_and(|held| held.same_credentials(&session)) =>
            {
                debug!(epoch = %state.epoch, "Duplicate session event ignored");
                return;
            }
            (_, Some(session)) => self.accept_session(&mut state, session),
        }

        self.publish(&state);
    }

    /// New generation: fast-path user now, bootstrap in the background.
    fn accept_session(self: &Arc<Self>, state: &mut State, session: Session) {
        state.invalidate();

        let user = fast_path::build_user(&session);
        info!(epoch = %state.epoch, user_id = %user.id, "Session accepted");

        state.session = Some(session);
        state.machine.begin(user);
        state.error = None;
        state.loading = false;

        self.dispatch(state);
    }

    /// Same subject, new tokens. The generation and user stay as they are.
    fn refresh_credentials(self: &Arc<Self>, state: &mut State, session: Session) {
        debug!(epoch = %state.epoch, "Session token refreshed");
        state.session = Some(session);

        if state.machine.status() == Some(BootstrapStatus::Error) && state.in_flight.is_none() {
            info!(epoch = %state.epoch, "Retrying failed bootstrap with refreshed token");
            state.machine.reenter_loading();
            state.error = None;
            self.dispatch(state);
        }
    }

    fn clear_session(&self, state: &mut State, reason: &'static str) {
        state.invalidate();

        if let Some(session) = state.session.take() {
            info!(epoch = %state.epoch, user_id = %session.subject(), reason, "Session cleared");
        }
        state.machine.clear();
        state.error = None;
        state.loading = false;
    }

    /// Spawn a bootstrap run for the current user, superseding any other
    /// dispatch under this epoch.
    fn dispatch(self: &Arc<Self>, state: &mut State) -> Option<JoinHandle<()>> {
        let (user, token) = match (state.machine.user(), state.session.as_ref()) {
            (Some(user), Some(session)) => (user.clone(), session.access_token().clone()),
            _ => return None,
        };

        state.cancel_pending();
        let ticket = state.next_ticket();
        let cancel = self.shutdown.child_token();
        state.in_flight = Some(InFlight {
            ticket,
            cancel: cancel.clone(),
        });

        let span = tracing::info_span!(
            "bootstrap",
            epoch = %ticket.epoch,
            seq = ticket.seq,
            user_id = %user.id
        );
        let shared = Arc::clone(self);

        Some(tokio::spawn(
            async move {
                let started = Instant::now();
                let run = shared.client.run(&user, &token, ticket.epoch, &cancel);
                let result = AssertUnwindSafe(run).catch_unwind().await;
                metrics::histogram!("session_bootstrap_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                match result {
                    Ok(outcome) => shared.complete(ticket, outcome),
                    Err(_) => shared.abandon(ticket),
                }
            }
            .instrument(span),
        ))
    }

    fn complete(self: &Arc<Self>, ticket: Ticket, result: TaggedOutcome) {
        let mut state = self.lock();

        let live = state.lifecycle == Lifecycle::Running
            && result.epoch == state.epoch
            && state
                .in_flight
                .as_ref()
                .is_some_and(|in_flight| in_flight.ticket == ticket);

        if !live {
            if result.outcome != BootstrapOutcome::Cancelled {
                metrics::counter!("session_bootstrap_stale_results_total").increment(1);
            }
            debug!(
                epoch = %result.epoch,
                current_epoch = %state.epoch,
                seq = ticket.seq,
                outcome = result.outcome.label(),
                "Discarding stale bootstrap result"
            );
            return;
        }

        state.in_flight = None;
        metrics::counter!("session_bootstrap_outcomes_total", "outcome" => result.outcome.label())
            .increment(1);

        if let Some(transition) = state.machine.apply(&result.outcome, self.clock.now()) {
            info!(
                epoch = %ticket.epoch,
                from = %transition.from,
                to = %transition.to,
                attempts = result.attempts,
                "Bootstrap resolved"
            );
            state.error = transition.error;
            if transition.schedule_retry {
                self.schedule_error_retry(&mut state);
            }
        }

        self.publish(&state);
    }

    /// The run for `ticket` panicked. Release the in-flight slot so a later
    /// resume or token refresh can dispatch again; the user stays `Loading`.
    fn abandon(&self, ticket: Ticket) {
        let mut state = self.lock();
        let owned = state
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.ticket == ticket);
        if !owned {
            return;
        }

        state.in_flight = None;
        metrics::counter!("session_bootstrap_outcomes_total", "outcome" => "panicked").increment(1);
        error!(epoch = %ticket.epoch, seq = ticket.seq, "Bootstrap task panicked");
        self.publish(&state);
    }

    fn schedule_error_retry(self: &Arc<Self>, state: &mut State) {
        if let Some(previous) = state.pending_retry.take() {
            previous.cancel.cancel();
        }

        let ticket = state.next_ticket();
        let cancel = self.shutdown.child_token();
        state.pending_retry = Some(PendingRetry {
            ticket,
            cancel: cancel.clone(),
        });

        let delay = self.error_retry_delay;
        let sleep = self.clock.sleep(delay);
        let shared = Arc::clone(self);

        info!(epoch = %ticket.epoch, delay_ms = delay.as_millis() as u64, "Bootstrap retry scheduled");

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = sleep => shared.fire_error_retry(ticket),
            }
        });
    }

    fn fire_error_retry(self: &Arc<Self>, ticket: Ticket) {
        let mut state = self.lock();

        let armed = state.lifecycle == Lifecycle::Running
            && state.epoch == ticket.epoch
            && state
                .pending_retry
                .as_ref()
                .is_some_and(|retry| retry.ticket == ticket);
        if !armed {
            return;
        }
        state.pending_retry = None;

        if state.machine.status() != Some(BootstrapStatus::Error) {
            return;
        }

        info!(epoch = %ticket.epoch, "Retrying bootstrap after error");
        state.machine.reenter_loading();
        state.error = None;
        self.dispatch(&mut state);
        self.publish(&state);
    }

    fn reconcile_visibility(self: &Arc<Self>, visibility: Visibility) {
        if visibility == Visibility::Hidden {
            debug!("Host hidden");
            return;
        }

        let mut state = self.lock();
        if state.lifecycle != Lifecycle::Running {
            return;
        }

        let current = if state.signed_out {
            None
        } else {
            self.events.current_session()
        };
        let action = visibility::reconcile(
            current,
            state.session.as_ref(),
            state.machine.status(),
            state.in_flight.is_some(),
        );

        match action {
            ReconcileAction::Nothing => {
                debug!(epoch = %state.epoch, "Session unchanged on resume");
                return;
            }
            ReconcileAction::SignOut => {
                info!(epoch = %state.epoch, "Session gone on resume");
                self.clear_session(&mut state, "absent on resume");
            }
            ReconcileAction::AcceptSession(session) => {
                info!(epoch = %state.epoch, "Session changed while hidden");
                self.accept_session(&mut state, session);
            }
            ReconcileAction::Rebootstrap => {
                info!(epoch = %state.epoch, "Re-running unresolved bootstrap on resume");
                state.machine.reenter_loading();
                state.error = None;
                self.dispatch(&mut state);
            }
        }

        self.publish(&state);
    }
}

async fn listen_for_events(shared: Arc<Shared>, mut subscription: EventSubscription) {
    let shutdown = shared.shutdown.clone();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = subscription.recv() => match event {
                Some(event) => shared.handle_event(event),
                None => {
                    debug!("Identity provider closed its event stream");
                    break;
                }
            },
        }
    }
    subscription.unsubscribe();
}

async fn listen_for_visibility(shared: Arc<Shared>, mut visibility: watch::Receiver<Visibility>) {
    let shutdown = shared.shutdown.clone();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = visibility.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *visibility.borrow_and_update();
                shared.reconcile_visibility(current);
            }
        }
    }
}

/// Root of the session lifecycle; the single source of the
/// `{user, session, loading, bootstrapping, error}` contract.
///
/// Dropping the orchestrator stops it.
pub struct SessionOrchestrator {
    shared: Arc<Shared>,
}

impl SessionOrchestrator {
    pub fn builder(
        provider: Arc<dyn IdentityProvider>,
        transport: Arc<dyn BootstrapTransport>,
    ) -> SessionOrchestratorBuilder {
        SessionOrchestratorBuilder::new(provider, transport)
    }

    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        transport: Arc<dyn BootstrapTransport>,
        settings: &BootstrapSettings,
    ) -> Self {
        Self::builder(provider, transport).settings(settings).build()
    }

    /// Subscribe to the provider and run the initial session check.
    ///
    /// Runs once per instance; later calls, including after [`stop`](Self::stop),
    /// do nothing. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let shared = &self.shared;
        let mut state = shared.lock();

        if state.lifecycle != Lifecycle::Idle {
            debug!(lifecycle = ?state.lifecycle, "Session orchestrator already initialized");
            return;
        }
        state.lifecycle = Lifecycle::Running;

        let subscription = shared.events.subscribe();
        match shared.events.current_session() {
            Some(session) => shared.accept_session(&mut state, session),
            None => state.loading = false,
        }
        info!(signed_in = state.session.is_some(), "Session orchestrator started");

        let events = tokio::spawn(listen_for_events(Arc::clone(shared), subscription));
        state.listeners.push(events);

        if let Some(visibility) = state.visibility.take() {
            let listener = tokio::spawn(listen_for_visibility(Arc::clone(shared), visibility));
            state.listeners.push(listener);
        }

        shared.publish(&state);
    }

    /// Unsubscribe and cancel every call and timer. Nothing started before
    /// `stop` can change the published state afterwards.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        if state.lifecycle == Lifecycle::Stopped {
            return;
        }
        let was_running = state.lifecycle == Lifecycle::Running;
        state.lifecycle = Lifecycle::Stopped;

        self.shared.shutdown.cancel();
        state.in_flight = None;
        state.pending_retry = None;
        state.visibility = None;
        for listener in state.listeners.drain(..) {
            listener.abort();
        }

        if was_running {
            info!(epoch = %state.epoch, "Session orchestrator stopped");
        }
        self.shared.publish(&state);
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().lifecycle == Lifecycle::Running
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.shared.snapshot_tx.borrow().user.clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.shared.snapshot_tx.borrow().session.clone()
    }

    pub fn loading(&self) -> bool {
        self.shared.snapshot_tx.borrow().loading
    }

    pub fn bootstrapping(&self) -> bool {
        self.shared.snapshot_tx.borrow().bootstrapping
    }

    pub fn error(&self) -> Option<String> {
        self.shared.snapshot_tx.borrow().error.clone()
    }

    /// Verify credentials with the identity provider.
    ///
    /// State is driven by the resulting `SignedIn` event, not by this call.
    /// On rejection the provider's error is returned and nothing changes.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), AuthError> {
        if !self.is_running() {
            return Err(AuthError::NotStarted);
        }

        match self
            .shared
            .events
            .provider()
            .sign_in_with_password(email, password)
            .await
        {
            Ok(session) => {
                info!(user_id = %session.subject(), "Sign-in accepted by identity provider");
                self.shared.lock().signed_out = false;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Sign-in rejected by identity provider");
                Err(e.into())
            }
        }
    }

    /// Sign out. Local state is cleared even if the provider call fails, and
    /// stays cleared until the next successful sign-in.
    pub async fn logout(&self) {
        {
            let mut state = self.shared.lock();
            state.signed_out = true;
            state.invalidate();
            self.shared.publish(&state);
        }

        if let Err(e) = self.shared.events.provider().sign_out().await {
            warn!(error = %e, "Identity provider sign-out failed, clearing local session anyway");
        }

        let mut state = self.shared.lock();
        self.shared.clear_session(&mut state, "logout");
        self.shared.publish(&state);
    }

    /// Re-run bootstrap for the current session without changing epoch.
    ///
    /// Resolves once that run has finished; any call already in flight is
    /// superseded and its result discarded.
    pub async fn refresh_bootstrap(&self) {
        let handle = {
            let mut state = self.shared.lock();
            if state.lifecycle != Lifecycle::Running || !state.machine.reenter_loading() {
                debug!("No session to refresh");
                return;
            }

            info!(epoch = %state.epoch, "Manual bootstrap refresh");
            state.error = None;
            let handle = self.shared.dispatch(&mut state);
            self.shared.publish(&state);
            handle
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!(error = %e, "Bootstrap task panicked");
                }
            }
        }
    }

    /// Report a host visibility change.
    pub fn on_visibility_change(&self, visibility: Visibility) {
        self.shared.reconcile_visibility(visibility);
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct SessionOrchestratorBuilder {
    provider: Arc<dyn IdentityProvider>,
    transport: Arc<dyn BootstrapTransport>,
    clock: Arc<dyn Clock>,
    schedule: RetrySchedule,
    retry_delay: Duration,
    error_retry_delay: Duration,
    visibility: Option<watch::Receiver<Visibility>>,
}

impl SessionOrchestratorBuilder {
    fn new(provider: Arc<dyn IdentityProvider>, transport: Arc<dyn BootstrapTransport>) -> Self {
        let defaults = BootstrapSettings::default();
        Self {
            provider,
            transport,
            clock: Arc::new(TokioClock),
            schedule: defaults.retry_schedule(),
            retry_delay: defaults.retry_delay(),
            error_retry_delay: defaults.error_retry_delay(),
            visibility: None,
        }
    }

    pub fn settings(mut self, settings: &BootstrapSettings) -> Self {
        self.schedule = settings.retry_schedule();
        self.retry_delay = settings.retry_delay();
        self.error_retry_delay = settings.error_retry_delay();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn error_retry_delay(mut self, delay: Duration) -> Self {
        self.error_retry_delay = delay;
        self
    }

    /// Host visibility feed, listened to between `start` and `stop`.
    pub fn visibility(mut self, visibility: watch::Receiver<Visibility>) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn build(self) -> SessionOrchestrator {
        let client = BootstrapClient::new(
            self.transport,
            Arc::clone(&self.clock),
            self.schedule,
            self.retry_delay,
        );
        let (snapshot_tx, _) = watch::channel(AuthSnapshot::initial());

        SessionOrchestrator {
            shared: Arc::new(Shared {
                events: SessionEventSource::new(self.provider),
                client,
                clock: self.clock,
                error_retry_delay: self.error_retry_delay,
                shutdown: CancellationToken::new(),
                state: Mutex::new(State::new(self.visibility)),
                snapshot_tx,
            }),
        }
    }
}
