//! In-memory collaborators for scheduler and workflow tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use enrollment_client::{
    BoxFuture, ClientError, EnrolledDeviceIdentity, EnrollmentService, EnrollmentToken,
    ManagedDeviceRecord, Page,
};
use tokio::time::Instant;

use crate::cooldown::Clock;
use crate::removal::Operator;

/// Wall clock that follows tokio's (paused) time.
#[derive(Clone)]
pub struct PausedClock {
    origin_utc: DateTime<Utc>,
    origin: Instant,
}

impl PausedClock {
    pub fn new() -> Self {
        Self {
            origin_utc: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
            origin: Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now() - self.origin;
        self.origin_utc + TimeDelta::from_std(elapsed).unwrap()
    }
}

/// Remote calls recorded by `FakeService`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListTokens,
    GetToken(String),
    Trigger(String),
    FindManaged(String),
    DeleteManaged(String),
    ListRoster(String, Option<String>),
    RemoveIdentity(String, String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Trigger(_) | Call::DeleteManaged(_) | Call::RemoveIdentity(..)
        )
    }
}

/// In-memory enrollment and device registries.
pub struct FakeService {
    clock: Arc<dyn Clock>,
    tokens: Mutex<Vec<EnrollmentToken>>,
    rosters: Mutex<HashMap<String, Vec<EnrolledDeviceIdentity>>>,
    managed: Mutex<Vec<ManagedDeviceRecord>>,
    calls: Mutex<Vec<Call>>,
    page_size: usize,
    pub failing_triggers: Mutex<HashSet<String>>,
    pub fail_listing: Mutex<bool>,
    /// Delete calls succeed but the record stays visible
    pub ghost_managed_deletes: Mutex<bool>,
    pub fail_managed_delete: Mutex<bool>,
    /// Managed-device lookups fail once any delete has been issued
    pub fail_lookup_after_delete: Mutex<bool>,
    pub fail_identity_removal: Mutex<bool>,
    /// Identity removal reports not-found even though the entry existed
    pub identity_already_gone: Mutex<bool>,
}

impl FakeService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tokens: Mutex::new(Vec::new()),
            rosters: Mutex::new(HashMap::new()),
            managed: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            page_size: 2,
            failing_triggers: Mutex::new(HashSet::new()),
            fail_listing: Mutex::new(false),
            ghost_managed_deletes: Mutex::new(false),
            fail_managed_delete: Mutex::new(false),
            fail_lookup_after_delete: Mutex::new(false),
            fail_identity_removal: Mutex::new(false),
            identity_already_gone: Mutex::new(false),
        }
    }

    /// Add a token last triggered `triggered_ago` before the clock's now.
    pub fn with_token(self, id: &str, triggered_ago: Option<TimeDelta>) -> Self {
        let triggered = triggered_ago.map(|ago| rfc3339(self.clock.now() - ago));
        self.with_raw_token(id, triggered.as_deref())
    }

    pub fn with_raw_token(self, id: &str, last_sync_triggered: Option<&str>) -> Self {
        self.tokens.lock().unwrap().push(EnrollmentToken {
            id: id.to_string(),
            token_name: Some(format!("Token {id}")),
            apple_identifier: Some(format!("{id}@example.com")),
            last_successful_sync: None,
            last_sync_triggered: last_sync_triggered.map(str::to_string),
            synced_device_count: 0,
        });
        self.rosters.lock().unwrap().entry(id.to_string()).or_default();
        self
    }

    pub fn with_identity(self, token_id: &str, serial: &str) -> Self {
        self.rosters
            .lock()
            .unwrap()
            .entry(token_id.to_string())
            .or_default()
            .push(EnrolledDeviceIdentity {
                id: format!("ident-{serial}"),
                serial_number: serial.to_string(),
                platform: Some("iOS".into()),
                description: None,
            });
        self
    }

    pub fn with_managed(self, serial: &str) -> Self {
        self.managed.lock().unwrap().push(ManagedDeviceRecord {
            id: format!("md-{serial}"),
            serial_number: serial.to_string(),
            device_name: Some(format!("Device {serial}")),
            operating_system: Some("iOS".into()),
            os_version: Some("17.5".into()),
            enrolled_at: None,
        });
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn triggers(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Trigger(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn roster_serials(&self, token_id: &str) -> Vec<String> {
        self.rosters.lock().unwrap()[token_id]
            .iter()
            .map(|i| i.serial_number.clone())
            .collect()
    }

    pub fn has_managed(&self, serial: &str) -> bool {
        self.managed
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.serial_number == serial)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn server_error(body: &str) -> ClientError {
    ClientError::Api {
        status: 500,
        body: body.to_string(),
    }
}

impl EnrollmentService for FakeService {
    fn list_enrollment_tokens(&self) -> BoxFuture<'_, enrollment_client::Result<Vec<EnrollmentToken>>> {
        Box::pin(async move {
            self.record(Call::ListTokens);
            if *self.fail_listing.lock().unwrap() {
                return Err(server_error("listing unavailable"));
            }
            Ok(self.tokens.lock().unwrap().clone())
        })
    }

    fn get_enrollment_token<'a>(
        &'a self,
        token_id: &'a str,
    ) -> BoxFuture<'a, enrollment_client::Result<EnrollmentToken>> {
        Box::pin(async move {
            self.record(Call::GetToken(token_id.to_string()));
            self.tokens
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == token_id)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(format!("enrollment token {token_id}")))
        })
    }

    fn trigger_enrollment_sync<'a>(
        &'a self,
        token_id: &'a str,
    ) -> BoxFuture<'a, enrollment_client::Result<()>> {
        Box::pin(async move {
            self.record(Call::Trigger(token_id.to_string()));
            if self.failing_triggers.lock().unwrap().contains(token_id) {
                return Err(ClientError::RateLimited(format!("sync {token_id}")));
            }
            let now = rfc3339(self.clock.now());
            let mut tokens = self.tokens.lock().unwrap();
            if let Some(token) = tokens.iter_mut().find(|t| t.id == token_id) {
                token.last_sync_triggered = Some(now);
            }
            Ok(())
        })
    }

    fn find_managed_device<'a>(
        &'a self,
        serial_number: &'a str,
    ) -> BoxFuture<'a, enrollment_client::Result<Option<ManagedDeviceRecord>>> {
        Box::pin(async move {
            self.record(Call::FindManaged(serial_number.to_string()));
            if *self.fail_lookup_after_delete.lock().unwrap()
                && self
                    .calls()
                    .iter()
                    .any(|c| matches!(c, Call::DeleteManaged(_)))
            {
                return Err(server_error("device lookup unavailable"));
            }
            Ok(self
                .managed
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.serial_number.eq_ignore_ascii_case(serial_number))
                .cloned())
        })
    }

    fn delete_managed_device<'a>(
        &'a self,
        device_id: &'a str,
    ) -> BoxFuture<'a, enrollment_client::Result<()>> {
        Box::pin(async move {
            self.record(Call::DeleteManaged(device_id.to_string()));
            if *self.fail_managed_delete.lock().unwrap() {
                return Err(server_error("delete failed"));
            }
            if !*self.ghost_managed_deletes.lock().unwrap() {
                self.managed.lock().unwrap().retain(|r| r.id != device_id);
            }
            Ok(())
        })
    }

    fn list_enrolled_device_identities<'a>(
        &'a self,
        token_id: &'a str,
        next_link: Option<&'a str>,
    ) -> BoxFuture<'a, enrollment_client::Result<Page<EnrolledDeviceIdentity>>> {
        Box::pin(async move {
            self.record(Call::ListRoster(
                token_id.to_string(),
                next_link.map(str::to_string),
            ));
            let offset: usize = next_link
                .and_then(|link| link.strip_prefix("offset:"))
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            let rosters = self.rosters.lock().unwrap();
            let roster = rosters
                .get(token_id)
                .ok_or_else(|| ClientError::NotFound(format!("enrollment token {token_id}")))?;
            let end = (offset + self.page_size).min(roster.len());
            Ok(Page {
                items: roster[offset..end].to_vec(),
                next_link: (end < roster.len()).then(|| format!("offset:{end}")),
            })
        })
    }

    fn remove_enrolled_device_identity<'a>(
        &'a self,
        token_id: &'a str,
        identity_id: &'a str,
    ) -> BoxFuture<'a, enrollment_client::Result<()>> {
        Box::pin(async move {
            self.record(Call::RemoveIdentity(
                token_id.to_string(),
                identity_id.to_string(),
            ));
            if *self.fail_identity_removal.lock().unwrap() {
                return Err(server_error("roster update failed"));
            }
            let mut rosters = self.rosters.lock().unwrap();
            let roster = rosters.entry(token_id.to_string()).or_default();
            let before = roster.len();
            roster.retain(|i| i.id != identity_id);
            if roster.len() == before || *self.identity_already_gone.lock().unwrap() {
                return Err(ClientError::NotFound(format!("identity {identity_id}")));
            }
            Ok(())
        })
    }
}

/// Operator that answers from a script and records every prompt.
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<bool>>,
    default: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn always(answer: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            default: answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer in order, then `false` for anything further.
    pub fn answers(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            default: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default)
    }
}
