//! Cooldown scheduler drivers
//!
//! Executes the actions returned by [`handle_event`] against the remote
//! service: status reads, countdowns and trigger dispatch. Tokens are
//! processed strictly one at a time in listing order.
//!
//! - [`Scheduler::run_pass`] visits every token once.
//! - [`Scheduler::run_continuous`] repeats passes until cancelled.
//! - [`Scheduler::trigger_once`] dispatches exactly one trigger for one token,
//!   waiting out any cooldown first.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use enrollment_client::{EnrollmentService, EnrollmentToken};
use tracing::{debug, info, warn};

use crate::cooldown::{Clock, CooldownState, TokenStatus, format_remaining};
use crate::countdown::{CancelFlag, CountdownOutcome, TICK, countdown};
use crate::error::{Error, Result};
use crate::machine::{Action, AfterCountdown, Event, Mode, Phase, handle_event};

/// Wait before re-listing after the token listing failed.
pub const LISTING_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Wait between passes that did not count down at all.
pub const IDLE_DELAY: Duration = Duration::from_secs(60);

/// Progress hooks for presenting scheduler activity.
///
/// Every method defaults to a no-op.
pub trait SyncObserver: Send + Sync {
    fn status(&self, _status: &TokenStatus, _state: CooldownState) {}
    fn status_unreadable(&self, _token_id: &str, _error: &Error) {}
    fn countdown_started(&self, _token_id: &str, _until: DateTime<Utc>, _then: AfterCountdown) {}
    fn countdown_tick(&self, _token_id: &str, _remaining_secs: u64) {}
    fn countdown_finished(&self, _token_id: &str, _outcome: CountdownOutcome) {}
    fn triggered(&self, _token_id: &str, _at: DateTime<Utc>) {}
    fn trigger_failed(&self, _token_id: &str, _error: &Error) {}
    /// Wait between passes started; cancellable like any countdown.
    fn pause_started(&self, _until: DateTime<Utc>) {}
    fn pause_finished(&self, _outcome: CountdownOutcome) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct SilentObserver;

impl SyncObserver for SilentObserver {}

/// Result of driving one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    /// Trigger accepted (and any post-trigger wait completed)
    Triggered { at: DateTime<Utc> },
    /// Trigger rejected; retried on the next pass
    Failed { error: String },
    /// Status could not be read or parsed
    Unreadable { error: String },
    /// Cancelled while cooling down; nothing dispatched
    Deferred { next_eligible_at: DateTime<Utc> },
    /// Trigger accepted, then cancelled during the post-trigger wait
    CancelledAfterTrigger { at: DateTime<Utc> },
}

impl TokenOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TokenOutcome::Deferred { .. } | TokenOutcome::CancelledAfterTrigger { .. }
        )
    }

    /// When the trigger was dispatched, if it was accepted.
    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        match self {
            TokenOutcome::Triggered { at } | TokenOutcome::CancelledAfterTrigger { at } => {
                Some(*at)
            }
            _ => None,
        }
    }
}

/// Per-token outcomes of one pass, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub outcomes: Vec<(String, TokenOutcome)>,
    /// Whether any countdown ran during the pass
    pub waited: bool,
}

impl PassReport {
    pub fn cancelled(&self) -> bool {
        self.outcomes.iter().any(|(_, outcome)| outcome.is_cancelled())
    }

    pub fn triggered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.triggered_at().is_some())
            .count()
    }
}

/// Totals for a continuous run that ended by cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub passes: u64,
    pub triggered: u64,
}

struct Driven {
    outcome: TokenOutcome,
    waited: bool,
}

/// Cooldown-aware trigger scheduler.
pub struct Scheduler {
    service: Arc<dyn EnrollmentService>,
    clock: Arc<dyn Clock>,
    cancel: CancelFlag,
    observer: Arc<dyn SyncObserver>,
    tick: Duration,
    idle_delay: Duration,
}

impl Scheduler {
    pub fn new(service: Arc<dyn EnrollmentService>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service,
            clock,
            cancel: CancelFlag::new(),
            observer: Arc::new(SilentObserver),
            tick: TICK,
            idle_delay: IDLE_DELAY,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_idle_delay(mut self, idle_delay: Duration) -> Self {
        self.idle_delay = idle_delay;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Visit every listed token once.
    ///
    /// A listing failure fails the pass. Per-token failures are reported in
    /// the returned outcomes and never stop later tokens. A cancelled
    /// countdown ends the pass early.
    pub async fn run_pass(&self) -> Result<PassReport> {
        let tokens = self
            .service
            .list_enrollment_tokens()
            .await
            .map_err(Error::Listing)?;
        metrics::counter!("dep_sync_passes_total").increment(1);
        debug!(tokens = tokens.len(), "starting sync pass");

        let mut report = PassReport::default();
        for token in tokens {
            let token_id = token.id.clone();
            let driven = self.drive(&token_id, Some(token), Mode::Continuous).await;
            report.waited |= driven.waited;
            let cancelled = driven.outcome.is_cancelled();
            report.outcomes.push((token_id, driven.outcome));
            if cancelled {
                break;
            }
        }
        Ok(report)
    }

    /// Repeat passes until cancelled.
    ///
    /// Passes that never counted down (no tokens, or every token failed) are
    /// followed by a cancellable idle wait so a persistent failure cannot
    /// turn into a request storm.
    pub async fn run_continuous(&self) -> RunOutcome {
        self.cancel.clear();
        let mut totals = RunOutcome::default();

        loop {
            let pause = match self.run_pass().await {
                Ok(report) => {
                    totals.passes += 1;
                    totals.triggered += report.triggered() as u64;
                    if report.cancelled() {
                        break;
                    }
                    (!report.waited).then_some(self.idle_delay)
                }
                Err(e) => {
                    warn!(error = %e, retry_in_secs = LISTING_RETRY_DELAY.as_secs(), "sync pass failed");
                    Some(LISTING_RETRY_DELAY)
                }
            };

            if let Some(pause) = pause {
                if self.pause(pause).await == CountdownOutcome::Elapsed {
                    continue;
                }
                break;
            }
            if self.cancel.is_requested() {
                break;
            }
        }

        info!(
            passes = totals.passes,
            triggered = totals.triggered,
            "sync loop cancelled"
        );
        totals
    }

    /// Dispatch exactly one trigger for `token_id`.
    ///
    /// Waits out any remaining cooldown first. Cancelling that wait returns
    /// [`TokenOutcome::Deferred`] without dispatching. With
    /// `wait_after_trigger`, a cancellable post-trigger countdown follows.
    pub async fn trigger_once(&self, token_id: &str, wait_after_trigger: bool) -> TokenOutcome {
        self.cancel.clear();
        self.drive(token_id, None, Mode::OneShot { wait_after_trigger })
            .await
            .outcome
    }

    async fn pause(&self, delay: Duration) -> CountdownOutcome {
        let until = self.clock.now() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
        self.observer.pause_started(until);
        let outcome = countdown(self.clock.as_ref(), until, &self.cancel, self.tick, |_| {}).await;
        self.observer.pause_finished(outcome);
        outcome
    }

    /// Run the state machine for one token until it is done.
    ///
    /// `snapshot` serves the first status read; later reads go to the service.
    async fn drive(
        &self,
        token_id: &str,
        mut snapshot: Option<EnrollmentToken>,
        mode: Mode,
    ) -> Driven {
        let mut phase = Phase::Checking;
        let mut action = Action::ReadStatus;
        let mut triggered_at: Option<DateTime<Utc>> = None;
        let mut outcome: Option<TokenOutcome> = None;
        let mut waited = false;

        loop {
            let event = match action {
                Action::ReadStatus => {
                    let event = self.read_status(token_id, snapshot.take()).await;
                    if let Err(e) = &event {
                        outcome = Some(TokenOutcome::Unreadable {
                            error: e.to_string(),
                        });
                    }
                    event.unwrap_or(Event::StatusUnreadable)
                }
                Action::Countdown { until } => {
                    waited = true;
                    let then = match phase {
                        Phase::CountingDown { then, .. } => then,
                        _ => AfterCountdown::Recheck,
                    };
                    match self.wait(token_id, until, then).await {
                        CountdownOutcome::Elapsed => Event::CountdownElapsed,
                        CountdownOutcome::Cancelled { .. } => {
                            outcome = Some(match triggered_at {
                                Some(at) => TokenOutcome::CancelledAfterTrigger { at },
                                None => TokenOutcome::Deferred {
                                    next_eligible_at: until,
                                },
                            });
                            Event::CountdownCancelled
                        }
                    }
                }
                Action::Dispatch => match self.dispatch(token_id).await {
                    Ok(at) => {
                        triggered_at = Some(at);
                        outcome = Some(TokenOutcome::Triggered { at });
                        Event::TriggerSucceeded { at }
                    }
                    Err(e) => {
                        outcome = Some(TokenOutcome::Failed {
                            error: e.to_string(),
                        });
                        Event::TriggerFailed
                    }
                },
                Action::Advance | Action::Stop | Action::None => break,
            };
            (phase, action) = handle_event(phase, event, mode);
        }

        let outcome = outcome.unwrap_or_else(|| TokenOutcome::Unreadable {
            error: format!("token {token_id} ended in phase {phase:?} without a result"),
        });
        Driven { outcome, waited }
    }

    async fn read_status(
        &self,
        token_id: &str,
        snapshot: Option<EnrollmentToken>,
    ) -> Result<Event> {
        let token = match snapshot {
            Some(token) => token,
            None => self
                .service
                .get_enrollment_token(token_id)
                .await
                .map_err(|source| Error::Status {
                    token_id: token_id.to_string(),
                    source,
                })
                .inspect_err(|e| self.report_unreadable(token_id, e))?,
        };

        let status = TokenStatus::from_token(&token).inspect_err(|e| self.report_unreadable(token_id, e))?;
        let now = self.clock.now();
        let state = status.cooldown(now);
        info!(
            token_id,
            name = %status.name,
            state = state.label(),
            remaining = %format_remaining(state.remaining_secs(now)),
            "token status"
        );
        self.observer.status(&status, state);
        Ok(Event::StatusRead(state))
    }

    fn report_unreadable(&self, token_id: &str, error: &Error) {
        warn!(token_id, error = %error, "token status unreadable, skipping this pass");
        self.observer.status_unreadable(token_id, error);
    }

    async fn wait(
        &self,
        token_id: &str,
        until: DateTime<Utc>,
        then: AfterCountdown,
    ) -> CountdownOutcome {
        self.observer.countdown_started(token_id, until, then);
        let observer = &self.observer;
        let outcome = countdown(self.clock.as_ref(), until, &self.cancel, self.tick, |remaining| {
            observer.countdown_tick(token_id, remaining)
        })
        .await;
        self.observer.countdown_finished(token_id, outcome);
        if let CountdownOutcome::Cancelled { remaining_secs } = outcome {
            info!(token_id, remaining_secs, "countdown cancelled");
        }
        outcome
    }

    async fn dispatch(&self, token_id: &str) -> Result<DateTime<Utc>> {
        match self.service.trigger_enrollment_sync(token_id).await {
            Ok(()) => {
                let at = self.clock.now();
                metrics::counter!("dep_sync_triggers_total", "result" => "success").increment(1);
                info!(token_id, "sync triggered");
                self.observer.triggered(token_id, at);
                Ok(at)
            }
            Err(source) => {
                let label = if matches!(source, enrollment_client::ClientError::RateLimited(_)) {
                    "rate_limited"
                } else {
                    "error"
                };
                metrics::counter!("dep_sync_triggers_total", "result" => label).increment(1);
                let err = Error::Trigger {
                    token_id: token_id.to_string(),
                    source,
                };
                warn!(token_id, error = %err, "sync trigger failed, retrying next pass");
                self.observer.trigger_failed(token_id, &err);
                Err(err)
            }
        }
    }
}
