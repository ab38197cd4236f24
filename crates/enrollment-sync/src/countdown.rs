//! Cancellable countdown
//!
//! A cooperative poll loop with a fixed tick. Remaining time is recomputed
//! from the clock on every tick instead of being decremented, so delayed ticks
//! and clock adjustments self-correct. Expiry is checked before cancellation:
//! when both are observed on the same tick, expiry wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cooldown::{Clock, remaining_secs};

/// Countdown tick granularity.
pub const TICK: Duration = Duration::from_secs(1);

/// Single-writer / single-reader cancellation flag.
///
/// The input watcher sets it; the countdown loop reads it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Re-arm the flag before a new wait.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// How a countdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Elapsed,
    Cancelled { remaining_secs: u64 },
}

/// Wait until `until`, calling `on_tick` with the remaining whole seconds
/// before each sleep.
pub async fn countdown<F>(
    clock: &dyn Clock,
    until: DateTime<Utc>,
    cancel: &CancelFlag,
    tick: Duration,
    mut on_tick: F,
) -> CountdownOutcome
where
    F: FnMut(u64) + Send,
{
    loop {
        let remaining = remaining_secs(until, clock.now());
        if remaining == 0 {
            return CountdownOutcome::Elapsed;
        }
        if cancel.is_requested() {
            return CountdownOutcome::Cancelled {
                remaining_secs: remaining,
            };
        }
        on_tick(remaining);
        tokio::time::sleep(tick.min(Duration::from_secs(remaining))).await;
    }
}
