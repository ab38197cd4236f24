//! Per-token scheduler state machine
//!
//! Pure state machine: receives events, returns (new_phase, action).
//! The caller (`Scheduler`) executes the I/O implied by each action and feeds
//! the result back as the next event.

use chrono::{DateTime, Utc};

use crate::cooldown::{CooldownState, cooldown_window};

/// What happens when a countdown finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterCountdown {
    /// Cooldown wait before dispatch: re-read status, then dispatch
    Recheck,
    /// Post-trigger wait: the token is done for this pass
    Finish,
}

/// Phase of one token within a scheduler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Checking,
    CountingDown {
        until: DateTime<Utc>,
        then: AfterCountdown,
    },
    Dispatching,
    Done,
}

/// Scheduler run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Loop over all tokens until cancelled
    Continuous,
    /// One trigger for one token, optionally followed by the post-trigger wait
    OneShot { wait_after_trigger: bool },
}

/// Events that drive phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Cooldown derived from a fresh status read
    StatusRead(CooldownState),
    /// Status could not be read or its timestamps could not be parsed
    StatusUnreadable,
    CountdownElapsed,
    CountdownCancelled,
    TriggerSucceeded { at: DateTime<Utc> },
    TriggerFailed,
}

/// Actions the caller should execute after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Re-read the token's status from the remote service
    ReadStatus,
    /// Run a cancellable countdown until the given instant
    Countdown { until: DateTime<Utc> },
    /// Issue the sync trigger
    Dispatch,
    /// Token finished for this pass; move to the next one
    Advance,
    /// Cancellation observed; stop scheduling
    Stop,
    /// No-op
    None,
}

/// Handle a transition. Pure function: no I/O.
pub fn handle_event(phase: Phase, event: Event, mode: Mode) -> (Phase, Action) {
    match (phase, event) {
        // --- Checking ---
        (Phase::Checking, Event::StatusRead(CooldownState::Eligible)) => {
            (Phase::Dispatching, Action::Dispatch)
        }

        (Phase::Checking, Event::StatusRead(CooldownState::CoolingDown { next_eligible_at })) => (
            Phase::CountingDown {
                until: next_eligible_at,
                then: AfterCountdown::Recheck,
            },
            Action::Countdown {
                until: next_eligible_at,
            },
        ),

        (Phase::Checking, Event::StatusUnreadable) => (Phase::Done, Action::Advance),

        // --- CountingDown ---
        (
            Phase::CountingDown {
                then: AfterCountdown::Recheck,
                ..
            },
            Event::CountdownElapsed,
        ) => (Phase::Checking, Action::ReadStatus),

        (
            Phase::CountingDown {
                then: AfterCountdown::Finish,
                ..
            },
            Event::CountdownElapsed,
        ) => (Phase::Done, Action::Advance),

        (Phase::CountingDown { .. }, Event::CountdownCancelled) => (Phase::Done, Action::Stop),

        // --- Dispatching ---
        (Phase::Dispatching, Event::TriggerSucceeded { at }) => match mode {
            Mode::OneShot {
                wait_after_trigger: false,
            } => (Phase::Done, Action::Advance),
            _ => {
                // Anchored at the local dispatch time: the server has not yet
                // reflected the new trigger timestamp.
                let until = at + cooldown_window();
                (
                    Phase::CountingDown {
                        until,
                        then: AfterCountdown::Finish,
                    },
                    Action::Countdown { until },
                )
            }
        },

        (Phase::Dispatching, Event::TriggerFailed) => (Phase::Done, Action::Advance),

        // --- Invalid/unhandled transition: stay in current phase ---
        (phase, _event) => (phase, Action::None),
    }
}
