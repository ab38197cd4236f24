//! Interactive terminal surface
//!
//! Countdown progress, confirmations and the status table. While a countdown
//! runs the terminal is put into raw mode and a blocking watcher thread turns
//! any key press into a cancellation request. Raw mode is left as soon as the
//! countdown ends so prompts and log lines render normally.

use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal;
use dialoguer::{Confirm, Input};
use enrollment_client::EnrollmentToken;
use enrollment_sync::cooldown::{format_local, format_remaining};
use enrollment_sync::{
    AfterCountdown, CancelFlag, Clock, CooldownState, CountdownOutcome, Operator,
    RemovalOutcome, RemovalReport, RemovalTarget, StepResult, SyncObserver, TokenOutcome,
    TokenStatus,
};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const KEY_POLL: Duration = Duration::from_millis(100);

/// Raw-mode key listener for the duration of one countdown.
///
/// Dropping it joins the polling thread before leaving raw mode, so no key
/// meant for the next prompt is consumed.
struct KeyWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl KeyWatcher {
    fn start(cancel: CancelFlag) -> Result<Self> {
        terminal::enable_raw_mode().map_err(|e| Error::Terminal(e.to_string()))?;
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = stop.clone();
        let thread = std::thread::spawn(move || {
            while !stopped.load(Ordering::Acquire) {
                match event::poll(KEY_POLL) {
                    Ok(true) => {
                        if let Ok(Event::Key(key)) = event::read() {
                            if key.kind == KeyEventKind::Press {
                                cancel.request();
                                return;
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        debug!(error = %e, "key polling stopped");
                        return;
                    }
                }
            }
        });
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for KeyWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("key watcher thread panicked");
            }
        }
        let _ = terminal::disable_raw_mode();
    }
}

/// Prints scheduler progress to stdout.
pub struct ConsoleObserver {
    cancel: CancelFlag,
    interactive: bool,
    watcher: Mutex<Option<KeyWatcher>>,
}

impl ConsoleObserver {
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            cancel,
            interactive: std::io::stdin().is_terminal(),
            watcher: Mutex::new(None),
        }
    }

    fn watcher(&self) -> std::sync::MutexGuard<'_, Option<KeyWatcher>> {
        self.watcher.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn hint(&self) -> &'static str {
        if self.interactive {
            " (press any key to stop)"
        } else {
            ""
        }
    }

    fn arm(&self) {
        if !self.interactive {
            return;
        }
        match KeyWatcher::start(self.cancel.clone()) {
            Ok(watcher) => *self.watcher() = Some(watcher),
            Err(e) => warn!(error = %e, "countdown cannot be cancelled from the keyboard"),
        }
    }

    fn disarm(&self) {
        self.watcher().take();
    }
}

impl SyncObserver for ConsoleObserver {
    fn status(&self, status: &TokenStatus, state: CooldownState) {
        println!(
            "{}: last triggered {}, last synced {}, {} device(s), {}",
            status.name,
            format_local(status.last_triggered),
            format_local(status.last_success),
            status.synced_device_count,
            state.label().replace('_', " ")
        );
    }

    fn status_unreadable(&self, token_id: &str, error: &enrollment_sync::Error) {
        println!("{token_id}: status unavailable ({error}), skipped this round");
    }

    fn countdown_started(&self, _token_id: &str, until: DateTime<Utc>, then: AfterCountdown) {
        let reason = match then {
            AfterCountdown::Recheck => "Cooling down until",
            AfterCountdown::Finish => "Next sync allowed at",
        };
        println!("{reason} {}{}", format_local(Some(until)), self.hint());
        self.arm();
    }

    fn countdown_tick(&self, _token_id: &str, remaining_secs: u64) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r  {} remaining ", format_remaining(remaining_secs));
        let _ = stdout.flush();
    }

    fn countdown_finished(&self, _token_id: &str, outcome: CountdownOutcome) {
        self.disarm();
        match outcome {
            CountdownOutcome::Elapsed => println!("\r  done            "),
            CountdownOutcome::Cancelled { remaining_secs } => println!(
                "\r  stopped with {} left",
                format_remaining(remaining_secs)
            ),
        }
    }

    fn triggered(&self, token_id: &str, at: DateTime<Utc>) {
        println!("Sync triggered for {token_id} at {}", format_local(Some(at)));
    }

    fn trigger_failed(&self, token_id: &str, error: &enrollment_sync::Error) {
        println!("Sync trigger for {token_id} failed: {error}");
    }

    fn pause_started(&self, until: DateTime<Utc>) {
        println!("Next pass at {}{}", format_local(Some(until)), self.hint());
        self.arm();
    }

    fn pause_finished(&self, outcome: CountdownOutcome) {
        self.disarm();
        if let CountdownOutcome::Cancelled { .. } = outcome {
            println!("Stopped before the next pass");
        }
    }
}

/// Confirmations through dialoguer, or unconditional approval with `--yes`.
pub struct ConsoleOperator {
    assume_yes: bool,
}

impl ConsoleOperator {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Operator for ConsoleOperator {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            println!("{prompt} yes");
            return true;
        }
        tokio::task::block_in_place(|| ask(prompt).unwrap_or(false))
    }

    fn review(&self, target: &RemovalTarget) {
        println!("{}", describe_target(target));
    }
}

/// Yes/no question defaulting to no.
pub fn ask(prompt: &str) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

/// Prompt for a serial number. Returns `None` when nothing was entered.
pub fn prompt_serial() -> Result<Option<String>> {
    let serial: String = Input::new()
        .with_prompt("Device serial number")
        .allow_empty(true)
        .interact_text()?;
    let serial = serial.trim();
    Ok((!serial.is_empty()).then(|| serial.to_string()))
}

pub fn describe_target(target: &RemovalTarget) -> String {
    let mut lines = vec![format!("Serial number {}:", target.serial_number)];
    match &target.managed {
        Some(record) => lines.push(format!(
            "  device management: {} ({} {}), record {}",
            record.device_name.as_deref().unwrap_or("unnamed device"),
            record.operating_system.as_deref().unwrap_or("unknown OS"),
            record.os_version.as_deref().unwrap_or(""),
            record.id
        )),
        None => lines.push("  device management: not found".to_string()),
    }
    match &target.enrolled {
        Some((token, identity)) => lines.push(format!(
            "  enrollment roster: {} (identity {})",
            token.display_name(),
            identity.id
        )),
        None => lines.push("  enrollment roster: not found".to_string()),
    }
    lines.join("\n")
}

fn describe_step(step: &StepResult) -> String {
    match step {
        StepResult::Skipped => "not present".to_string(),
        StepResult::Removed => "removed".to_string(),
        StepResult::AlreadyAbsent => "already absent".to_string(),
        StepResult::Declined => "declined".to_string(),
        StepResult::Failed(reason) => format!("failed: {reason}"),
    }
}

fn describe_sync(sync: &Option<TokenOutcome>) -> String {
    match sync {
        None => "not requested".to_string(),
        Some(TokenOutcome::Triggered { at }) => format!("triggered at {}", format_local(Some(*at))),
        Some(TokenOutcome::CancelledAfterTrigger { at }) => format!(
            "triggered at {}, stopped waiting",
            format_local(Some(*at))
        ),
        Some(TokenOutcome::Deferred { next_eligible_at }) => format!(
            "not triggered, token cooling down until {}",
            format_local(Some(*next_eligible_at))
        ),
        Some(TokenOutcome::Failed { error }) | Some(TokenOutcome::Unreadable { error }) => {
            format!("failed: {error}")
        }
    }
}

pub fn describe_report(report: &RemovalReport) -> String {
    [
        format!("Removal of {}:", report.target.serial_number),
        format!("  device management: {}", describe_step(&report.managed)),
        format!("  enrollment roster: {}", describe_step(&report.roster)),
        format!("  sync: {}", describe_sync(&report.sync)),
    ]
    .join("\n")
}

pub fn describe_outcome(serial: &str, outcome: &RemovalOutcome) -> String {
    match outcome {
        RemovalOutcome::NothingToRemove => {
            format!("{serial} was not found in device management or any enrollment roster")
        }
        RemovalOutcome::Declined => format!("Nothing changed for {serial}"),
        RemovalOutcome::Completed(report) => describe_report(report),
    }
}

/// Token table for the `status` command.
pub fn status_table(tokens: &[EnrollmentToken], clock: &dyn Clock) -> String {
    let now = clock.now();
    let mut rows = vec![[
        "TOKEN".to_string(),
        "LAST TRIGGERED".to_string(),
        "LAST SYNCED".to_string(),
        "DEVICES".to_string(),
        "STATE".to_string(),
    ]];
    for token in tokens {
        let row = match TokenStatus::from_token(token) {
            Ok(status) => {
                let state = status.cooldown(now);
                let state = match state {
                    CooldownState::Eligible => "eligible".to_string(),
                    CooldownState::CoolingDown { .. } => {
                        format!("cooling down ({})", format_remaining(state.remaining_secs(now)))
                    }
                };
                [
                    status.name,
                    format_local(status.last_triggered),
                    format_local(status.last_success),
                    status.synced_device_count.to_string(),
                    state,
                ]
            }
            Err(e) => [
                token.display_name().to_string(),
                "?".to_string(),
                "?".to_string(),
                token.synced_device_count.to_string(),
                format!("unreadable: {e}"),
            ],
        };
        rows.push(row);
    }

    let mut widths = [0usize; 5];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    rows.iter()
        .map(|row| {
            row.iter()
                .zip(widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
