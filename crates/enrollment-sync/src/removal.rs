//! Ordered device removal
//!
//! Removes one device, identified by serial number, from both registries:
//!
//! 1. Resolve the serial in device management and in every token roster
//!    (read-only).
//! 2. Delete the managed-device record.
//! 3. Wait the settling delay and confirm the record is gone. Still present,
//!    or unreadable, aborts before the roster is touched.
//! 4. Remove the roster entry. An entry that is already gone is not an error.
//! 5. Optionally trigger a sync for the affected token.
//!
//! Each destructive step is gated by an [`Operator`] confirmation.

use std::sync::Arc;
use std::time::Duration;

use enrollment_client::{
    EnrolledDeviceIdentity, EnrollmentService, EnrollmentToken, ManagedDeviceRecord,
    enrolled_identities,
};
use futures_util::TryStreamExt;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::scheduler::{Scheduler, TokenOutcome};

/// Wait between deleting the managed record and checking that it is gone.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// The person (or policy) approving destructive steps.
pub trait Operator: Send + Sync {
    /// Ask a yes/no question. `false` declines.
    fn confirm(&self, prompt: &str) -> bool;

    /// Present what was found before any confirmation is requested.
    fn review(&self, _target: &RemovalTarget) {}
}

/// Where a serial number was found.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalTarget {
    pub serial_number: String,
    pub managed: Option<ManagedDeviceRecord>,
    pub enrolled: Option<(EnrollmentToken, EnrolledDeviceIdentity)>,
}

impl RemovalTarget {
    pub fn is_empty(&self) -> bool {
        self.managed.is_none() && self.enrolled.is_none()
    }
}

/// Result of one destructive step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Nothing was resolved for this registry
    Skipped,
    Removed,
    /// The entry disappeared between resolution and removal
    AlreadyAbsent,
    Declined,
    Failed(String),
}

/// Per-step results of a removal that got past its first confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalReport {
    pub target: RemovalTarget,
    pub managed: StepResult,
    pub roster: StepResult,
    pub sync: Option<TokenOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemovalOutcome {
    /// The serial is in neither registry
    NothingToRemove,
    /// The operator declined the first destructive step
    Declined,
    Completed(RemovalReport),
}

/// Drives one removal at a time.
pub struct RemovalWorkflow {
    service: Arc<dyn EnrollmentService>,
    scheduler: Arc<Scheduler>,
    operator: Arc<dyn Operator>,
    settle_delay: Duration,
}

impl RemovalWorkflow {
    pub fn new(
        service: Arc<dyn EnrollmentService>,
        scheduler: Arc<Scheduler>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        Self {
            service,
            scheduler,
            operator,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Look the serial up in both registries.
    ///
    /// Rosters are scanned token by token in listing order; the first
    /// case-insensitive match wins and stops the scan.
    pub async fn resolve(&self, serial: &str) -> Result<RemovalTarget> {
        let resolve_err = |source| Error::Resolve {
            serial: serial.to_string(),
            source,
        };

        let managed = self
            .service
            .find_managed_device(serial)
            .await
            .map_err(resolve_err)?;

        let tokens = self
            .service
            .list_enrollment_tokens()
            .await
            .map_err(resolve_err)?;

        let mut enrolled = None;
        'tokens: for token in tokens {
            let identities = enrolled_identities(self.service.as_ref(), &token.id);
            let mut identities = std::pin::pin!(identities);
            while let Some(identity) = identities.try_next().await.map_err(resolve_err)? {
                if identity.matches_serial(serial) {
                    enrolled = Some((token.clone(), identity));
                    break 'tokens;
                }
            }
        }

        Ok(RemovalTarget {
            serial_number: serial.to_string(),
            managed,
            enrolled,
        })
    }

    /// Run the whole workflow for one serial number.
    pub async fn run(&self, serial: &str) -> Result<RemovalOutcome> {
        let serial = serial.trim();
        if serial.is_empty() {
            return Ok(RemovalOutcome::NothingToRemove);
        }

        let target = self.resolve(serial).await?;
        info!(
            serial,
            managed = target.managed.as_ref().map(|r| r.id.as_str()),
            token_id = target.enrolled.as_ref().map(|(t, _)| t.id.as_str()),
            "serial resolved"
        );
        if target.is_empty() {
            info!(serial, "serial not found in either registry, nothing to remove");
            return Ok(RemovalOutcome::NothingToRemove);
        }
        self.operator.review(&target);

        let mut confirmed_any = false;

        let managed = match &target.managed {
            None => StepResult::Skipped,
            Some(record) => {
                let prompt = format!(
                    "Delete {} ({}) from device management?",
                    record.device_name.as_deref().unwrap_or(&record.serial_number),
                    record.id
                );
                if !self.operator.confirm(&prompt) {
                    info!(serial, "managed device deletion declined");
                    return Ok(RemovalOutcome::Declined);
                }
                confirmed_any = true;
                self.delete_managed(serial, record).await?;
                StepResult::Removed
            }
        };

        let mut report = RemovalReport {
            roster: StepResult::Skipped,
            managed,
            sync: None,
            target: target.clone(),
        };

        let Some((token, identity)) = &target.enrolled else {
            return Ok(RemovalOutcome::Completed(report));
        };

        let prompt = format!(
            "Remove {} from the roster of {}?",
            identity.serial_number,
            token.display_name()
        );
        if !self.operator.confirm(&prompt) {
            info!(serial, token_id = %token.id, "roster removal declined");
            if !confirmed_any {
                return Ok(RemovalOutcome::Declined);
            }
            report.roster = StepResult::Declined;
            return Ok(RemovalOutcome::Completed(report));
        }
        report.roster = self.remove_identity(token, identity).await;

        if matches!(
            report.roster,
            StepResult::Removed | StepResult::AlreadyAbsent | StepResult::Failed(_)
        ) {
            let prompt = format!("Trigger a sync for {} now?", token.display_name());
            if self.operator.confirm(&prompt) {
                let wait = self
                    .operator
                    .confirm("Wait out the cooldown after the sync is triggered?");
                report.sync = Some(self.scheduler.trigger_once(&token.id, wait).await);
            }
        }

        Ok(RemovalOutcome::Completed(report))
    }

    async fn delete_managed(&self, serial: &str, record: &ManagedDeviceRecord) -> Result<()> {
        self.service
            .delete_managed_device(&record.id)
            .await
            .map_err(|source| Error::ManagedDeviceDelete {
                device_id: record.id.clone(),
                source,
            })?;
        metrics::counter!("dep_sync_removals_total", "registry" => "managed").increment(1);
        info!(serial, device_id = %record.id, "managed device deleted, waiting to verify");

        // Deletion propagates asynchronously; not interruptible.
        tokio::time::sleep(self.settle_delay).await;

        match self.service.find_managed_device(serial).await {
            Ok(None) => {
                info!(serial, device_id = %record.id, "managed device deletion verified");
                Ok(())
            }
            Ok(Some(still)) => Err(Error::VerificationFailed {
                device_id: still.id,
                settle_secs: self.settle_delay.as_secs(),
            }),
            Err(source) => Err(Error::VerificationRead {
                serial: serial.to_string(),
                source,
            }),
        }
    }

    async fn remove_identity(
        &self,
        token: &EnrollmentToken,
        identity: &EnrolledDeviceIdentity,
    ) -> StepResult {
        match self
            .service
            .remove_enrolled_device_identity(&token.id, &identity.id)
            .await
        {
            Ok(()) => {
                metrics::counter!("dep_sync_removals_total", "registry" => "roster").increment(1);
                info!(token_id = %token.id, identity_id = %identity.id, "roster entry removed");
                StepResult::Removed
            }
            Err(e) if e.is_not_found() => {
                warn!(token_id = %token.id, identity_id = %identity.id, "roster entry already absent");
                StepResult::AlreadyAbsent
            }
            Err(e) => {
                warn!(token_id = %token.id, identity_id = %identity.id, error = %e, "roster removal failed");
                StepResult::Failed(e.to_string())
            }
        }
    }
}
