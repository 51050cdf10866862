//! Time source for bootstrap timeouts, retry delays and validation stamps.
//!
//! Everything that waits goes through [`Clock`] so tests can substitute a
//! recording or paused clock for wall-clock delays.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::time::Duration;

pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock instant, used for `validated_at`.
    fn now(&self) -> DateTime<Utc>;

    /// Future that resolves after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// [`Clock`] backed by `tokio::time`.
///
/// Honors tokio's paused test clock, so `#[tokio::test(start_paused = true)]`
/// drives it deterministically.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
