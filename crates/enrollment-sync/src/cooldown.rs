//! Token status model
//!
//! Derives a token's cooldown state from the last-triggered timestamp the
//! remote service reports. Pure functions of their inputs: "now" is always
//! supplied by the caller through a `Clock`.

use std::time::Duration;

use chrono::{DateTime, Datelike, Local, TimeDelta, Utc};
use enrollment_client::EnrollmentToken;

use crate::error::{Error, Result};

/// Minimum interval between accepted sync triggers for one token.
pub const COOLDOWN_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real UTC wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `COOLDOWN_WINDOW` as a chrono delta.
pub fn cooldown_window() -> TimeDelta {
    TimeDelta::seconds(COOLDOWN_WINDOW.as_secs() as i64)
}

/// Whether a token may be triggered now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Eligible,
    CoolingDown { next_eligible_at: DateTime<Utc> },
}

impl CooldownState {
    /// Derive the cooldown state from the last trigger time.
    ///
    /// A token that was never triggered is always eligible.
    pub fn derive(last_triggered: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match last_triggered {
            None => CooldownState::Eligible,
            Some(at) if now - at >= cooldown_window() => CooldownState::Eligible,
            Some(at) => CooldownState::CoolingDown {
                next_eligible_at: at + cooldown_window(),
            },
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, CooldownState::Eligible)
    }

    /// Whole seconds until eligible (0 when eligible).
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        match self {
            CooldownState::Eligible => 0,
            CooldownState::CoolingDown { next_eligible_at } => remaining_secs(*next_eligible_at, now),
        }
    }

    /// Status label for display and logging.
    pub fn label(&self) -> &'static str {
        match self {
            CooldownState::Eligible => "eligible",
            CooldownState::CoolingDown { .. } => "cooling_down",
        }
    }
}

/// Seconds from `now` until `deadline`, rounded up and clamped at zero.
pub fn remaining_secs(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let delta = deadline - now;
    if delta <= TimeDelta::zero() {
        return 0;
    }
    let whole = delta.num_seconds();
    let rounded = if delta > TimeDelta::seconds(whole) {
        whole + 1
    } else {
        whole
    };
    rounded as u64
}

/// Parse a remote timestamp.
///
/// Missing, blank and the `0001-01-01T00:00:00Z` "never" sentinel all map to
/// `None`. Anything else must be RFC 3339.
pub fn parse_timestamp(raw: Option<&str>) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| e.to_string())?
        .with_timezone(&Utc);
    if parsed.year() <= 1 {
        return Ok(None);
    }
    Ok(Some(parsed))
}

/// Render a timestamp in the operator's local time zone.
pub fn format_local(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "never".to_string(),
    }
}

/// Render a second count as `MM:SS`, or `H:MM:SS` past an hour.
pub fn format_remaining(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// Parsed status snapshot of one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub token_id: String,
    pub name: String,
    pub last_triggered: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub synced_device_count: u64,
}

impl TokenStatus {
    /// Parse the token's timestamps. A malformed value fails this token only.
    pub fn from_token(token: &EnrollmentToken) -> Result<Self> {
        let parse = |field: &'static str, raw: Option<&String>| {
            parse_timestamp(raw.map(String::as_str)).map_err(|reason| Error::Timestamp {
                token_id: token.id.clone(),
                field,
                value: raw.cloned().unwrap_or_default(),
                reason,
            })
        };

        Ok(Self {
            token_id: token.id.clone(),
            name: token.display_name().to_string(),
            last_triggered: parse("last sync triggered", token.last_sync_triggered.as_ref())?,
            last_success: parse("last successful sync", token.last_successful_sync.as_ref())?,
            synced_device_count: token.synced_device_count,
        })
    }

    pub fn cooldown(&self, now: DateTime<Utc>) -> CooldownState {
        CooldownState::derive(self.last_triggered, now)
    }
}
