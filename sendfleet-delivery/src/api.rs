//! Product-facing engine operations
//!
//! The surrounding product (campaign flow, dashboard, settings pages)
//! talks to the engine through these methods rather than touching jobs
//! and accounts directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sendfleet_common::{
    AccountId, AccountStatus, CampaignId, EmailJob, EventCounts, JobId, JobStatus, OrgId,
    ReportingWindow, StoreError,
};
use serde::Deserialize;

use crate::{
    error::Result,
    scheduler::Scheduler,
    scorer::Assessment,
    warmup::{self, WarmupConfig},
};

/// A batch of sends to schedule, one job per lead.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub org_id: OrgId,
    pub campaign_id: CampaignId,
    pub lead_ids: Vec<Arc<str>>,
    pub step_id: Arc<str>,
    #[serde(default)]
    pub variant_id: Option<Arc<str>>,
    /// Defaults to "now".
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Defaults to 5; clamped to 1-10.
    #[serde(default)]
    pub priority: Option<u8>,
}

/// What to cancel.
#[derive(Debug, Clone)]
pub enum CancelScope {
    Jobs(Vec<JobId>),
    Campaign(CampaignId),
    AllPending(OrgId),
}

/// Deliverability for one sending account.
#[derive(Debug, Clone)]
pub struct AccountDeliverability {
    pub account_id: AccountId,
    pub email: Arc<str>,
    pub assessment: Assessment,
    pub recommendations: Vec<String>,
}

/// Org-wide deliverability with a per-account breakdown.
#[derive(Debug, Clone)]
pub struct DeliverabilityReport {
    pub assessment: Assessment,
    pub counts: EventCounts,
    pub recommendations: Vec<String>,
    pub accounts: Vec<AccountDeliverability>,
}

/// Queue counts by job status.
pub type QueueStats = ahash::AHashMap<JobStatus, u64>;

impl Scheduler {
    /// Schedule one job per lead. Jobs land in `Scheduled` and are
    /// picked up by the next tick at or after their scheduled time.
    ///
    /// # Errors
    ///
    /// Returns an error for store faults or a missing `init()`.
    pub async fn enqueue_sends(&self, request: EnqueueRequest) -> Result<Vec<EmailJob>> {
        let store = self.store()?;
        let scheduled_at = request.scheduled_at.unwrap_or_else(Utc::now);

        let mut jobs = Vec::with_capacity(request.lead_ids.len());
        for lead_id in request.lead_ids {
            let mut job = EmailJob::new(
                request.org_id.clone(),
                request.campaign_id.clone(),
                lead_id,
                Arc::clone(&request.step_id),
                scheduled_at,
            )
            .with_max_attempts(self.retry.max_attempts);

            if let Some(priority) = request.priority {
                job = job.with_priority(priority);
            }
            if let Some(variant_id) = &request.variant_id {
                job = job.with_variant(Arc::clone(variant_id));
            }

            store.insert_job(job.clone()).await?;
            jobs.push(job);
        }

        tracing::info!(
            target: "sendfleet::api",
            campaign = %request.campaign_id,
            step = %request.step_id,
            count = jobs.len(),
            "enqueued sends"
        );

        Ok(jobs)
    }

    /// Cancel every claimable job in `scope`. Jobs already `Sending` or
    /// terminal are left alone; a send racing this call keeps its true
    /// outcome. Unknown ids in a `Jobs` scope are skipped so the rest
    /// of the batch still cancels.
    ///
    /// Returns how many jobs were actually cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error for store faults or a missing `init()`.
    pub async fn cancel_sends(&self, scope: CancelScope) -> Result<usize> {
        let store = self.store()?;
        let now = Utc::now();

        let targets = match scope {
            CancelScope::Jobs(ids) => {
                let mut jobs = Vec::with_capacity(ids.len());
                for id in ids {
                    match store.job(id).await {
                        Ok(job) => jobs.push(job),
                        Err(StoreError::JobNotFound(id)) => {
                            tracing::debug!(
                                target: "sendfleet::api",
                                job = %id,
                                "cancel target not found, skipping"
                            );
                        }
                        Err(error) => return Err(error.into()),
                    }
                }
                jobs
            }
            CancelScope::Campaign(campaign_id) => store.jobs_by_campaign(&campaign_id).await?,
            CancelScope::AllPending(org_id) => store.claimable_jobs(&org_id).await?,
        };

        let mut cancelled = 0usize;
        for mut job in targets {
            if job.cancel(now) {
                store.update_job(&job).await?;
                cancelled += 1;
            }
        }

        tracing::info!(target: "sendfleet::api", cancelled, "cancelled sends");
        Ok(cancelled)
    }

    /// Job counts by status for an organization, optionally scoped to
    /// one campaign.
    ///
    /// # Errors
    ///
    /// Returns an error for store faults or a missing `init()`.
    pub async fn queue_stats(
        &self,
        org_id: &OrgId,
        campaign_id: Option<&CampaignId>,
    ) -> Result<QueueStats> {
        Ok(self.store()?.job_counts(org_id, campaign_id).await?)
    }

    /// Deliverability over `window`: the org-wide assessment plus a
    /// breakdown per sending account, each with its remediation list.
    ///
    /// # Errors
    ///
    /// Returns an error for store faults or a missing `init()`.
    pub async fn deliverability(
        &self,
        org_id: &OrgId,
        window: ReportingWindow,
        campaign_id: Option<&CampaignId>,
    ) -> Result<DeliverabilityReport> {
        let store = self.store()?;

        let counts = store
            .event_counts(org_id, None, campaign_id, window)
            .await?;
        let assessment = self.scoring.assess(&counts);
        let recommendations = self.scoring.recommendations(&assessment);

        let mut accounts = Vec::new();
        for account in store.accounts(org_id).await? {
            let account_counts = store
                .event_counts(org_id, Some(&account.id), campaign_id, window)
                .await?;
            let account_assessment = self.scoring.assess(&account_counts);
            let account_recommendations = self.scoring.recommendations(&account_assessment);
            accounts.push(AccountDeliverability {
                account_id: account.id,
                email: account.email,
                assessment: account_assessment,
                recommendations: account_recommendations,
            });
        }

        Ok(DeliverabilityReport {
            assessment,
            counts,
            recommendations,
            accounts,
        })
    }

    /// Enable or disable warmup for a set of accounts.
    ///
    /// When `config` is given it is validated before anything mutates;
    /// a malformed curve changes no account. Enabling flips `Active`
    /// accounts to `Warming` and stamps the start date on first enable;
    /// disabling flips `Warming` back to `Active`.
    ///
    /// Returns how many accounts were updated.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid curve, or a store
    /// fault.
    pub async fn set_warmup(
        &self,
        account_ids: &[AccountId],
        enabled: bool,
        config: Option<&WarmupConfig>,
    ) -> Result<usize> {
        // Fail fast, before any account is touched
        if let Some(config) = config {
            config.validate()?;
        }
        let curve = config.unwrap_or(&self.warmup);

        let store = self.store()?;
        let today = Utc::now().date_naive();
        let mut updated = 0usize;

        for account_id in account_ids {
            let mut account = store.account(account_id).await?;

            if enabled {
                account.warmup_enabled = true;
                if account.warmup_started_on.is_none() {
                    account.warmup_started_on = Some(today);
                }
                if account.status == AccountStatus::Active {
                    account.status = AccountStatus::Warming;
                }
                if let Some(started_on) = account.warmup_started_on {
                    account.warmup_progress =
                        curve.progress(warmup::day_index(started_on, today));
                }
            } else {
                account.warmup_enabled = false;
                if account.status == AccountStatus::Warming {
                    account.status = AccountStatus::Active;
                }
            }

            store.update_account(&account).await?;
            updated += 1;
        }

        tracing::info!(target: "sendfleet::api", enabled, updated, "warmup toggled");
        Ok(updated)
    }
}
