//! Per-attempt timeout schedule for bootstrap calls.

use std::time::Duration;

/// Ordered, finite list of attempt timeouts consumed by one bootstrap run.
///
/// Attempt `n` is bounded by the `n`th entry; running off the end of the
/// list means the run is exhausted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrySchedule {
    timeouts: Vec<Duration>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::from_millis(&[2_000, 4_000, 8_000, 16_000])
    }
}

impl RetrySchedule {
    pub fn new(timeouts: Vec<Duration>) -> Self {
        Self { timeouts }
    }

    pub fn from_millis(timeouts_ms: &[u64]) -> Self {
        Self::new(timeouts_ms.iter().copied().map(Duration::from_millis).collect())
    }

    /// Doubling-style schedule: `initial * multiplier^n`, capped at `max`.
    pub fn exponential(initial: Duration, multiplier: f64, attempts: u32, max: Duration) -> Self {
        let timeouts = (0..attempts)
            .map(|attempt| {
                let timeout = initial.as_millis() as f64 * multiplier.powi(attempt as i32);
                Duration::from_millis(timeout.min(max.as_millis() as f64) as u64)
            })
            .collect();
        Self { timeouts }
    }

    pub fn attempts(&self) -> usize {
        self.timeouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeouts.is_empty()
    }

    pub fn timeouts(&self) -> &[Duration] {
        &self.timeouts
    }

    pub fn iter(&self) -> impl Iterator<Item = Duration> + '_ {
        self.timeouts.iter().copied()
    }
}
