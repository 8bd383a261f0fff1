//! In-memory [`Store`] implementation
//!
//! Jobs and accounts live in `DashMap`s; the event ledger is a `Vec`
//! behind an `RwLock`. Intended for tests and for deployments that keep
//! engine state transient across restarts.
//!
//! Claim atomicity comes from `DashMap::get_mut`, which holds the shard
//! write lock while the status check and transition happen.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::{
    account::SendingAccount,
    id::{AccountId, CampaignId, JobId, OrgId},
    job::{EmailJob, JobStatus},
    store::{DeliveryEvent, EventCounts, ReportingWindow, Result, Store, StoreError},
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: DashMap<JobId, EmailJob>,
    accounts: DashMap<AccountId, SendingAccount>,
    events: RwLock<Vec<DeliveryEvent>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs currently stored.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Number of ledger entries currently stored.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_job(&self, job: EmailJob) -> Result<()> {
        self.jobs.insert(job.id, job);
        Ok(())
    }

    async fn job(&self, id: JobId) -> Result<EmailJob> {
        self.jobs
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::JobNotFound(id))
    }

    async fn update_job(&self, job: &EmailJob) -> Result<()> {
        if self.jobs.contains_key(&job.id) {
            self.jobs.insert(job.id, job.clone());
            Ok(())
        } else {
            Err(StoreError::JobNotFound(job.id))
        }
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<EmailJob>> {
        let mut due: Vec<EmailJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.is_due(now))
            .map(|entry| entry.clone())
            .collect();

        // Highest priority first, then earliest due, then id for a
        // stable total order
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.scheduled_at.cmp(&b.scheduled_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        due.truncate(limit);

        Ok(due)
    }

    async fn claim_job(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<EmailJob>> {
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            return Err(StoreError::JobNotFound(id));
        };

        if !entry.status.is_claimable() || entry.scheduled_at > now {
            return Ok(None);
        }

        entry.status = JobStatus::Sending;
        entry.last_attempt_at = Some(now);

        Ok(Some(entry.clone()))
    }

    async fn jobs_by_campaign(&self, campaign_id: &CampaignId) -> Result<Vec<EmailJob>> {
        let mut jobs: Vec<EmailJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.campaign_id == *campaign_id)
            .map(|entry| entry.clone())
            .collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn claimable_jobs(&self, org_id: &OrgId) -> Result<Vec<EmailJob>> {
        let mut jobs: Vec<EmailJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.org_id == *org_id && entry.status.is_claimable())
            .map(|entry| entry.clone())
            .collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn job_counts(
        &self,
        org_id: &OrgId,
        campaign_id: Option<&CampaignId>,
    ) -> Result<ahash::AHashMap<JobStatus, u64>> {
        let mut counts = ahash::AHashMap::new();
        for entry in &self.jobs {
            if entry.org_id != *org_id {
                continue;
            }
            if let Some(campaign) = campaign_id
                && entry.campaign_id != *campaign
            {
                continue;
            }
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn account(&self, id: &AccountId) -> Result<SendingAccount> {
        self.accounts
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::AccountNotFound(id.clone()))
    }

    async fn accounts(&self, org_id: &OrgId) -> Result<Vec<SendingAccount>> {
        let mut accounts: Vec<SendingAccount> = self
            .accounts
            .iter()
            .filter(|entry| entry.org_id == *org_id)
            .map(|entry| entry.clone())
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn all_accounts(&self) -> Result<Vec<SendingAccount>> {
        let mut accounts: Vec<SendingAccount> =
            self.accounts.iter().map(|entry| entry.clone()).collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn insert_account(&self, account: SendingAccount) -> Result<()> {
        self.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn update_account(&self, account: &SendingAccount) -> Result<()> {
        if self.accounts.contains_key(&account.id) {
            self.accounts.insert(account.id.clone(), account.clone());
            Ok(())
        } else {
            Err(StoreError::AccountNotFound(account.id.clone()))
        }
    }

    async fn record_event(&self, event: DeliveryEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn event_counts(
        &self,
        org_id: &OrgId,
        account_id: Option<&AccountId>,
        campaign_id: Option<&CampaignId>,
        window: ReportingWindow,
    ) -> Result<EventCounts> {
        let events = self.events.read();
        let mut counts = EventCounts::default();
        for event in events.iter() {
            if event.org_id != *org_id {
                continue;
            }
            if let Some(account) = account_id
                && event.account_id != *account
            {
                continue;
            }
            if let Some(campaign) = campaign_id
                && event.campaign_id.as_ref() != Some(campaign)
            {
                continue;
            }
            if window.contains(event.occurred_at) {
                counts.record(event.kind);
            }
        }
        Ok(counts)
    }
}
