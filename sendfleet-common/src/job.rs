//! The `EmailJob` model and its status state machine
//!
//! A job is one scheduled outbound message. Jobs are append-mostly: they
//! are created by the campaign flow, mutated only by the scheduler (and
//! explicit cancellation), and never deleted. Every terminal transition
//! happens exactly once; the mutators below guard against re-terminating
//! an already-finished job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AccountId, CampaignId, JobId, OrgId};

/// Default number of delivery attempts before a job is failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default job priority (1 = lowest, 10 = highest).
pub const DEFAULT_PRIORITY: u8 = 5;

/// Lifecycle status of a send job.
///
/// `Scheduled → Sending → {Sent | Bounced}`; transient failures bounce the
/// job back to `Scheduled` with an incremented attempt counter until
/// `Failed`. `Pending` is an alias state used by the campaign flow for
/// jobs awaiting their first schedule; the scheduler treats it exactly
/// like `Scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for its scheduled time.
    Pending,
    /// Scheduled (possibly rescheduled after a transient failure).
    Scheduled,
    /// Claimed by a tick; a provider send may be in flight.
    Sending,
    /// Delivered to the provider; terminal.
    Sent,
    /// All attempts exhausted or a permanent error; terminal.
    Failed,
    /// Cancelled before a send started; terminal.
    Cancelled,
    /// Hard-bounced by the receiving system; terminal.
    Bounced,
}

impl JobStatus {
    /// Whether this status ends the job's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed | Self::Cancelled | Self::Bounced)
    }

    /// Whether a tick may claim a job in this status.
    #[must_use]
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Bounced => "bounced",
        };
        write!(f, "{s}")
    }
}

/// One scheduled outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJob {
    /// Unique job id (ULID, sortable by creation time).
    pub id: JobId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Campaign this send belongs to.
    pub campaign_id: CampaignId,
    /// Lead (recipient) reference, opaque to the engine.
    pub lead_id: Arc<str>,
    /// Sequence step within the campaign.
    pub step_id: Arc<str>,
    /// Optional A/B variant.
    pub variant_id: Option<Arc<str>>,
    /// Sending account, resolved by the selector at claim time.
    pub account_id: Option<AccountId>,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Priority 1–10; higher drains first.
    pub priority: u8,
    /// When the job becomes due (also the retry "next eligible time").
    pub scheduled_at: DateTime<Utc>,
    /// Delivery attempts consumed so far.
    pub attempts: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Start of the most recent attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When a terminal status was reached.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last error message, if any.
    pub error: Option<String>,
    /// Message id returned by the provider on success.
    pub provider_message_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl EmailJob {
    /// Create a new job in `Scheduled` status, due at `scheduled_at`.
    #[must_use]
    pub fn new(
        org_id: OrgId,
        campaign_id: CampaignId,
        lead_id: impl Into<Arc<str>>,
        step_id: impl Into<Arc<str>>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::generate(),
            org_id,
            campaign_id,
            lead_id: lead_id.into(),
            step_id: step_id.into(),
            variant_id: None,
            account_id: None,
            status: JobStatus::Scheduled,
            priority: DEFAULT_PRIORITY,
            scheduled_at,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            last_attempt_at: None,
            completed_at: None,
            error: None,
            provider_message_id: None,
            created_at: Utc::now(),
        }
    }

    /// Set the priority, clamped to the valid 1–10 range.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    /// Set the A/B variant.
    #[must_use]
    pub fn with_variant(mut self, variant_id: impl Into<Arc<str>>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }

    /// Set the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether the job is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.scheduled_at <= now
    }

    /// Whether the attempt budget is exhausted.
    #[must_use]
    pub const fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Assign the resolved sending account for the current attempt.
    pub fn assign_account(&mut self, account_id: AccountId) {
        self.account_id = Some(account_id);
    }

    /// Record a successful provider send; terminal `Sent`.
    pub fn record_success(&mut self, provider_message_id: impl Into<String>, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Sent;
        self.provider_message_id = Some(provider_message_id.into());
        self.error = None;
        self.completed_at = Some(now);
    }

    /// Record a hard bounce; terminal `Bounced`.
    pub fn record_bounce(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Bounced;
        self.error = Some(error.into());
        self.completed_at = Some(now);
    }

    /// Record a permanent failure (or an exhausted attempt budget);
    /// terminal `Failed`.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
    }

    /// Record a transient failure: consume one attempt and reschedule.
    ///
    /// The attempt counter never exceeds `max_attempts`; callers check
    /// [`Self::attempts_exhausted`] afterwards and terminate the job via
    /// [`Self::record_failure`] when the budget is gone.
    pub fn record_retry(
        &mut self,
        error: impl Into<String>,
        next_attempt_at: DateTime<Utc>,
    ) {
        if self.status.is_terminal() {
            return;
        }
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.error = Some(error.into());
        self.status = JobStatus::Scheduled;
        self.scheduled_at = next_attempt_at;
    }

    /// Push the job back to `Scheduled` without consuming an attempt.
    ///
    /// Used when no eligible account exists: capacity exhaustion is not
    /// the job's fault.
    pub fn defer(&mut self, next_eligible_at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Scheduled;
        self.scheduled_at = next_eligible_at;
        self.account_id = None;
    }

    /// Cancel the job if it has not started sending.
    ///
    /// Returns `true` if the job was cancelled. A no-op on `Sending` and
    /// terminal jobs: cancellation is best-effort and never rewrites a
    /// recorded outcome.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.is_claimable() {
            return false;
        }
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn job() -> EmailJob {
        EmailJob::new(
            OrgId::new("org-1"),
            CampaignId::new("camp-1"),
            "lead-1",
            "step-1",
            Utc::now(),
        )
    }

    #[test]
    fn new_job_defaults() {
        let job = job();
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.priority, DEFAULT_PRIORITY);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(job.attempts, 0);
        assert!(job.account_id.is_none());
        assert!(job.provider_message_id.is_none());
    }

    #[test]
    fn priority_is_clamped() {
        assert_eq!(job().with_priority(0).priority, 1);
        assert_eq!(job().with_priority(7).priority, 7);
        assert_eq!(job().with_priority(200).priority, 10);
    }

    #[test]
    fn terminal_status_is_reached_exactly_once() {
        let now = Utc::now();
        let mut job = job();
        job.record_success("msg-1", now);
        assert_eq!(job.status, JobStatus::Sent);

        // A later bounce/failure/cancel must not rewrite the outcome
        job.record_bounce("bounced", now);
        job.record_failure("failed", now);
        assert!(!job.cancel(now));
        assert_eq!(job.status, JobStatus::Sent);
        assert_eq!(job.provider_message_id.as_deref(), Some("msg-1"));
    }

    #[test]
    fn attempts_never_exceed_budget() {
        let now = Utc::now();
        let mut job = job();
        for _ in 0..10 {
            job.record_retry("timeout", now);
        }
        assert!(job.attempts <= job.max_attempts);
        assert!(job.attempts_exhausted());
    }

    #[test]
    fn retry_reschedules_without_terminating() {
        let now = Utc::now();
        let next = now + chrono::Duration::seconds(120);
        let mut job = job();
        job.record_retry("connection refused", next);
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.scheduled_at, next);
        assert_eq!(job.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn defer_does_not_consume_an_attempt() {
        let now = Utc::now();
        let mut job = job();
        job.assign_account(AccountId::new("acct-1"));
        job.defer(now + chrono::Duration::seconds(60));
        assert_eq!(job.attempts, 0);
        assert_eq!(job.status, JobStatus::Scheduled);
        assert!(job.account_id.is_none());
    }

    #[test]
    fn cancel_only_applies_before_sending() {
        let now = Utc::now();
        let mut job = job();
        assert!(job.cancel(now));
        assert_eq!(job.status, JobStatus::Cancelled);

        let mut job2 = self::job();
        job2.status = JobStatus::Sending;
        assert!(!job2.cancel(now));
        assert_eq!(job2.status, JobStatus::Sending);
    }

    #[test]
    fn status_classification() {
        assert!(JobStatus::Sent.is_terminal());
        assert!(JobStatus::Bounced.is_terminal());
        assert!(!JobStatus::Sending.is_terminal());
        assert!(JobStatus::Pending.is_claimable());
        assert!(JobStatus::Scheduled.is_claimable());
        assert!(!JobStatus::Sending.is_claimable());
    }
}
