//! Cooldown-aware sync scheduling and ordered device removal
//!
//! Every enrollment token accepts at most one sync trigger per 15-minute
//! window. The scheduler reads each token's last-triggered timestamp, waits
//! out any remaining cooldown with a cancellable countdown, then dispatches.
//! The removal workflow deletes a device from device management, verifies the
//! deletion has propagated, and only then removes it from its token roster.
//!
//! Per-token lifecycle (one scheduler pass):
//! 1. `Checking` → cooldown derived from the token's timestamps
//! 2. Cooling down → `CountingDown` until eligible → back to `Checking`
//! 3. Eligible → `Dispatching` → trigger call
//! 4. Trigger accepted → `CountingDown` a fresh window from dispatch → `Done`
//! 5. Trigger rejected or status unreadable → `Done`, retried next pass

pub mod cooldown;
pub mod countdown;
pub mod error;
pub mod machine;
pub mod removal;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use cooldown::{COOLDOWN_WINDOW, Clock, CooldownState, SystemClock, TokenStatus};
pub use countdown::{CancelFlag, CountdownOutcome, TICK, countdown};
pub use error::{Error, Result};
pub use machine::{Action, AfterCountdown, Event, Mode, Phase, handle_event};
pub use removal::{Operator, RemovalOutcome, RemovalReport, RemovalTarget, RemovalWorkflow, StepResult};
pub use scheduler::{PassReport, RunOutcome, Scheduler, SyncObserver, TokenOutcome};
