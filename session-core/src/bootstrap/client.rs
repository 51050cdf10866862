//! Bootstrap call with a bounded retry schedule.
//!
//! Each attempt races the transport against its own timeout and the
//! caller's cancellation token. `401` and `403` end the run immediately;
//! transient failures move on to the next schedule entry after a short
//! fixed delay.

use crate::bootstrap::retry::RetrySchedule;
use crate::bootstrap::status::BootstrapPayload;
use crate::bootstrap::transport::{BootstrapTransport, TransportReply};
use crate::clock::Clock;
use crate::error::BootstrapError;
use crate::models::{Epoch, User};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a full bootstrap run.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    /// `2xx` with a parsed payload.
    Resolved(BootstrapPayload),
    /// `403`: not assigned to an active tenant. Carries the body's payload
    /// when it parsed, so a disabled tenant can still be named.
    AccessDenied(Option<BootstrapPayload>),
    /// `401`: token rejected.
    TokenInvalid,
    /// Schedule ran out without a terminal answer.
    Exhausted(BootstrapError),
    /// Cancelled by logout, stop or supersession.
    Cancelled,
}

impl BootstrapOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            BootstrapOutcome::Resolved(_) => "resolved",
            BootstrapOutcome::AccessDenied(_) => "access_denied",
            BootstrapOutcome::TokenInvalid => "token_invalid",
            BootstrapOutcome::Exhausted(_) => "exhausted",
            BootstrapOutcome::Cancelled => "cancelled",
        }
    }
}

/// Outcome stamped with the epoch its run was started under.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedOutcome {
    pub epoch: Epoch,
    pub attempts: usize,
    pub outcome: BootstrapOutcome,
}

#[derive(Clone)]
pub struct BootstrapClient {
    transport: Arc<dyn BootstrapTransport>,
    clock: Arc<dyn Clock>,
    schedule: RetrySchedule,
    retry_delay: Duration,
}

impl BootstrapClient {
    pub fn new(
        transport: Arc<dyn BootstrapTransport>,
        clock: Arc<dyn Clock>,
        schedule: RetrySchedule,
        retry_delay: Duration,
    ) -> Self {
        Self {
            transport,
            clock,
            schedule,
            retry_delay,
        }
    }

    /// Walk the retry schedule until a terminal answer, exhaustion or
    /// cancellation.
    pub async fn run(
        &self,
        user: &User,
        access_token: &Secret<String>,
        epoch: Epoch,
        cancel: &CancellationToken,
    ) -> TaggedOutcome {
        let total = self.schedule.attempts();
        let mut last_error = None;
        let mut made = 0;

        for (index, timeout) in self.schedule.iter().enumerate() {
            let attempt = index + 1;
            made = attempt;
            metrics::counter!("session_bootstrap_attempts_total").increment(1);

            let outcome = match self.attempt(access_token, timeout, cancel).await {
                Ok(payload) => {
                    if attempt > 1 {
                        info!(
                            epoch = %epoch,
                            user_id = %user.id,
                            attempt,
                            "Bootstrap succeeded after retry"
                        );
                    }
                    BootstrapOutcome::Resolved(payload)
                }
                Err(BootstrapError::Cancelled) => {
                    debug!(epoch = %epoch, attempt, "Bootstrap cancelled");
                    BootstrapOutcome::Cancelled
                }
                Err(BootstrapError::TokenInvalid) => {
                    warn!(epoch = %epoch, user_id = %user.id, "Bootstrap rejected token, not retrying");
                    BootstrapOutcome::TokenInvalid
                }
                Err(BootstrapError::AccessDenied(payload)) => {
                    warn!(epoch = %epoch, user_id = %user.id, "Bootstrap denied access, not retrying");
                    BootstrapOutcome::AccessDenied(payload)
                }
                Err(e) if !e.is_retryable() => BootstrapOutcome::Exhausted(e),
                Err(e) => {
                    let remaining = total - attempt;
                    warn!(
                        epoch = %epoch,
                        user_id = %user.id,
                        attempt,
                        remaining,
                        timeout_ms = timeout.as_millis() as u64,
                        error = %e,
                        "Bootstrap attempt failed"
                    );
                    last_error = Some(e);

                    if remaining > 0 && !self.pause(cancel).await {
                        return self.tag(epoch, attempt, BootstrapOutcome::Cancelled);
                    }
                    continue;
                }
            };

            return self.tag(epoch, attempt, outcome);
        }

        let exhausted = BootstrapError::RetriesExhausted {
            attempts: made,
            last: last_error.map(Box::new),
        };
        warn!(epoch = %epoch, user_id = %user.id, error = %exhausted, "Bootstrap retries exhausted");
        self.tag(epoch, made, BootstrapOutcome::Exhausted(exhausted))
    }

    async fn attempt(
        &self,
        access_token: &Secret<String>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<BootstrapPayload, BootstrapError> {
        let call = self.transport.post_bootstrap(access_token.expose_secret());
        let deadline = self.clock.sleep(timeout);

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BootstrapError::Cancelled),
            _ = deadline => return Err(BootstrapError::Timeout { after: timeout }),
            reply = call => reply,
        };

        let reply = reply.map_err(|e| BootstrapError::Network(e.to_string()))?;
        classify(reply)
    }

    /// Fixed delay between attempts. `false` when cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.clock.sleep(self.retry_delay) => true,
        }
    }

    fn tag(&self, epoch: Epoch, attempts: usize, outcome: BootstrapOutcome) -> TaggedOutcome {
        TaggedOutcome {
            epoch,
            attempts,
            outcome,
        }
    }
}

/// Map a raw reply onto a payload or a classified error.
pub fn classify(reply: TransportReply) -> Result<BootstrapPayload, BootstrapError> {
    match reply.status {
        401 => Err(BootstrapError::TokenInvalid),
        403 => Err(BootstrapError::AccessDenied(
            serde_json::from_str(&reply.body).ok(),
        )),
        200..=299 => serde_json::from_str(&reply.body)
            .map_err(|e| BootstrapError::Malformed(e.to_string())),
        other => Err(BootstrapError::Status(other)),
    }
}
