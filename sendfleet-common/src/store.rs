//! Storage boundary between the delivery engine and the product's database
//!
//! The engine never talks to a database directly. Everything it persists
//! goes through the [`Store`] trait: job lifecycle updates, account
//! counters, and the delivery-event ledger the scorer aggregates over.
//! [`MemoryStore`] is the in-process implementation used by tests and by
//! deployments that keep engine state transient.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    account::SendingAccount,
    id::{AccountId, CampaignId, JobId, OrgId},
    job::{EmailJob, JobStatus},
};

pub mod memory;

pub use memory::MemoryStore;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors produced by a [`Store`] backend.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A deliverability signal attributed to one account.
///
/// Events are append-only. `Sent` events are written by the scheduler;
/// the rest arrive from provider webhooks and tracking pixels outside
/// this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sent,
    Delivered,
    Opened,
    Clicked,
    /// Permanent rejection by the receiving system.
    BouncedHard,
    /// Transient rejection (mailbox full, greylisting).
    BouncedSoft,
    /// Spam complaint.
    Complained,
    Unsubscribed,
    Replied,
}

/// One entry in the delivery-event ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub org_id: OrgId,
    pub account_id: AccountId,
    pub campaign_id: Option<CampaignId>,
    pub job_id: Option<JobId>,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}

impl DeliveryEvent {
    /// Create an event occurring now.
    #[must_use]
    pub fn new(org_id: OrgId, account_id: AccountId, kind: EventKind) -> Self {
        Self {
            org_id,
            account_id,
            campaign_id: None,
            job_id: None,
            kind,
            occurred_at: Utc::now(),
        }
    }

    /// Attribute the event to a campaign and job.
    #[must_use]
    pub fn for_job(mut self, campaign_id: CampaignId, job_id: JobId) -> Self {
        self.campaign_id = Some(campaign_id);
        self.job_id = Some(job_id);
        self
    }
}

/// Aggregated event counts over a reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub bounced: u64,
    pub complained: u64,
    pub unsubscribed: u64,
    pub replied: u64,
}

impl EventCounts {
    /// Fold one event kind into the aggregate.
    pub const fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::Sent => self.sent += 1,
            EventKind::Delivered => self.delivered += 1,
            EventKind::Opened => self.opened += 1,
            EventKind::Clicked => self.clicked += 1,
            EventKind::BouncedHard | EventKind::BouncedSoft => self.bounced += 1,
            EventKind::Complained => self.complained += 1,
            EventKind::Unsubscribed => self.unsubscribed += 1,
            EventKind::Replied => self.replied += 1,
        }
    }

    /// Bounces per hundred sends. `None` when nothing was sent.
    #[must_use]
    pub fn bounce_rate(&self) -> Option<f64> {
        (self.sent > 0).then(|| {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.bounced as f64 / self.sent as f64 * 100.0;
            rate
        })
    }

    /// Complaints per hundred sends. `None` when nothing was sent.
    #[must_use]
    pub fn spam_rate(&self) -> Option<f64> {
        (self.sent > 0).then(|| {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.complained as f64 / self.sent as f64 * 100.0;
            rate
        })
    }
}

/// How far back an aggregation query looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingWindow {
    /// Everything on record.
    AllTime,
    /// Events on or after the given instant.
    Since(DateTime<Utc>),
}

impl ReportingWindow {
    /// Window covering the last `days` days.
    #[must_use]
    pub fn last_days(days: i64) -> Self {
        Self::Since(Utc::now() - chrono::Duration::days(days))
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        match self {
            Self::AllTime => true,
            Self::Since(cutoff) => at >= *cutoff,
        }
    }
}

/// Persistence operations the delivery engine relies on.
///
/// Implementations must make [`Store::claim_job`] atomic with respect to
/// concurrent claims of the same job; everything else is last-write-wins.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Persist a new job.
    async fn insert_job(&self, job: EmailJob) -> Result<()>;

    /// Fetch a job by id.
    async fn job(&self, id: JobId) -> Result<EmailJob>;

    /// Overwrite a job's persisted state.
    async fn update_job(&self, job: &EmailJob) -> Result<()>;

    /// Jobs due at `now`, ordered by priority (descending), then
    /// scheduled time, then id. At most `limit` jobs are returned.
    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<EmailJob>>;

    /// Atomically claim a due job for sending.
    ///
    /// Returns the job moved to `Sending`, or `None` if it was no longer
    /// claimable (raced with a cancellation or another tick).
    async fn claim_job(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<EmailJob>>;

    /// All jobs belonging to a campaign.
    async fn jobs_by_campaign(&self, campaign_id: &CampaignId) -> Result<Vec<EmailJob>>;

    /// Every not-yet-claimed job for an organization.
    async fn claimable_jobs(&self, org_id: &OrgId) -> Result<Vec<EmailJob>>;

    /// Job counts per status for an organization, optionally scoped to
    /// one campaign.
    async fn job_counts(
        &self,
        org_id: &OrgId,
        campaign_id: Option<&CampaignId>,
    ) -> Result<ahash::AHashMap<JobStatus, u64>>;

    /// Fetch an account by id.
    async fn account(&self, id: &AccountId) -> Result<SendingAccount>;

    /// All accounts belonging to an organization.
    async fn accounts(&self, org_id: &OrgId) -> Result<Vec<SendingAccount>>;

    /// Every account across all organizations. Used by maintenance.
    async fn all_accounts(&self) -> Result<Vec<SendingAccount>>;

    /// Persist a new account.
    async fn insert_account(&self, account: SendingAccount) -> Result<()>;

    /// Overwrite an account's persisted state.
    async fn update_account(&self, account: &SendingAccount) -> Result<()>;

    /// Append a delivery event to the ledger.
    async fn record_event(&self, event: DeliveryEvent) -> Result<()>;

    /// Aggregate events for an organization over a window, optionally
    /// scoped to one account and/or one campaign.
    async fn event_counts(
        &self,
        org_id: &OrgId,
        account_id: Option<&AccountId>,
        campaign_id: Option<&CampaignId>,
        window: ReportingWindow,
    ) -> Result<EventCounts>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_fold_bounce_kinds_together() {
        let mut counts = EventCounts::default();
        counts.record(EventKind::Sent);
        counts.record(EventKind::Sent);
        counts.record(EventKind::BouncedHard);
        counts.record(EventKind::BouncedSoft);
        counts.record(EventKind::Complained);

        assert_eq!(counts.sent, 2);
        assert_eq!(counts.bounced, 2);
        assert_eq!(counts.complained, 1);
    }

    #[test]
    fn rates_are_undefined_without_sends() {
        let counts = EventCounts {
            bounced: 3,
            ..Default::default()
        };
        assert!(counts.bounce_rate().is_none());
        assert!(counts.spam_rate().is_none());
    }

    #[test]
    fn rates_are_percentages_of_sends() {
        let counts = EventCounts {
            sent: 200,
            bounced: 10,
            complained: 1,
            ..Default::default()
        };
        assert!((counts.bounce_rate().unwrap_or_default() - 5.0).abs() < f64::EPSILON);
        assert!((counts.spam_rate().unwrap_or_default() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn window_containment() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::days(30);
        assert!(ReportingWindow::AllTime.contains(earlier));
        assert!(ReportingWindow::Since(now).contains(now));
        assert!(!ReportingWindow::Since(now).contains(earlier));
    }
}
