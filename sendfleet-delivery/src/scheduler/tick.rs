//! One scheduler tick: claim, select, send, record
//!
//! Claiming and account selection run serially so each reservation sees
//! the counter updates of the one before it; the provider sends
//! themselves fan out onto a bounded `JoinSet`. The tick returns only
//! after every spawned send has recorded its outcome.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use sendfleet_common::{
    DeliveryEvent, EmailJob, EventKind, SendingAccount, Store,
};
use sendfleet_provider::{Channel, OutboundMessage, SendError, attempt_send};
use tokio::task::JoinSet;

use crate::{
    error::Result,
    policy::RetryPolicy,
    selector,
    scheduler::Scheduler,
};

pub(crate) async fn run(scheduler: &Scheduler) -> Result<usize> {
    let store = scheduler.store()?;
    let channels = scheduler.channels()?;
    let composer = scheduler.composer()?;
    let limiter = scheduler.limiter()?;

    let due = store.due_jobs(Utc::now(), scheduler.batch_size).await?;
    if due.is_empty() {
        return Ok(0);
    }

    let deadline = Duration::from_secs(scheduler.send_timeout_secs);
    let capacity_delay = chrono::Duration::seconds(
        i64::try_from(scheduler.no_capacity_delay_secs).unwrap_or(900),
    );

    let mut sends = JoinSet::new();
    let mut dispatched = 0usize;

    for due_job in due {
        let now = Utc::now();

        // Raced with a cancellation or another claim
        let Some(mut job) = store.claim_job(due_job.id, now).await? else {
            continue;
        };

        // Fresh pool every job so this tick's reservations are visible
        let accounts = store.accounts(&job.org_id).await?;
        let Some(mut account) =
            selector::select_account(&accounts, &scheduler.warmup, limiter, now)
        else {
            // Capacity exhaustion is not the job's fault
            job.defer(now + capacity_delay);
            store.update_job(&job).await?;
            tracing::debug!(
                target: "sendfleet::scheduler",
                job_id = %job.id,
                "no account with capacity, deferred"
            );
            continue;
        };

        // The reservation is committed; charge the daily counter before
        // the send so a crash over-counts rather than over-sends
        account.sent_today += 1;
        account.last_used_at = Some(now);
        store.update_account(&account).await?;

        job.assign_account(account.id.clone());
        store.update_job(&job).await?;

        let Some(channel) = channels.channel(&account.id) else {
            tracing::warn!(
                target: "sendfleet::scheduler",
                account = %account.id,
                "account has no registered channel, pulling it from rotation"
            );
            account.record_fault("no provider channel registered");
            store.update_account(&account).await?;
            job.defer(now + capacity_delay);
            store.update_job(&job).await?;
            continue;
        };

        let message = match composer.compose(&job).await {
            Ok(message) => message,
            Err(reason) => {
                job.record_failure(format!("compose failed: {reason}"), now);
                store.update_job(&job).await?;
                continue;
            }
        };

        while sends.len() >= scheduler.max_concurrent_sends {
            sends.join_next().await;
        }

        dispatched += 1;
        sends.spawn(dispatch(
            Arc::clone(store),
            scheduler.retry.clone(),
            job,
            account,
            channel,
            message,
            deadline,
        ));
    }

    // The tick is not done until every outcome is recorded
    while sends.join_next().await.is_some() {}

    Ok(dispatched)
}

/// One provider send plus its bookkeeping. Runs on the worker pool;
/// failures to persist are logged, never silently dropped.
async fn dispatch(
    store: Arc<dyn Store>,
    retry: RetryPolicy,
    mut job: EmailJob,
    account: SendingAccount,
    channel: Arc<dyn Channel>,
    message: OutboundMessage,
    deadline: Duration,
) {
    let outcome = attempt_send(channel.as_ref(), &account.email, &message, deadline).await;
    let now = Utc::now();

    let event = match outcome {
        Ok(receipt) => {
            tracing::info!(
                target: "sendfleet::scheduler",
                job_id = %job.id,
                account = %account.id,
                provider_message_id = %receipt.provider_message_id,
                "sent"
            );
            job.record_success(receipt.provider_message_id, now);
            Some(EventKind::Sent)
        }
        Err(error) if error.is_transient() => {
            let attempts_after = (job.attempts + 1).min(job.max_attempts);
            let next = retry.next_retry_at(attempts_after, now);
            job.record_retry(error.to_string(), next);

            if job.attempts_exhausted() {
                tracing::warn!(
                    target: "sendfleet::scheduler",
                    job_id = %job.id,
                    attempts = job.attempts,
                    %error,
                    "retry budget exhausted"
                );
                job.record_failure(
                    format!("all {} attempts failed, last error: {error}", job.attempts),
                    now,
                );
            } else {
                tracing::debug!(
                    target: "sendfleet::scheduler",
                    job_id = %job.id,
                    attempts = job.attempts,
                    next_attempt_at = %next,
                    %error,
                    "transient failure, rescheduled"
                );
            }
            None
        }
        Err(SendError::HardBounce(reason)) => {
            tracing::warn!(
                target: "sendfleet::scheduler",
                job_id = %job.id,
                account = %account.id,
                %reason,
                "hard bounce"
            );
            job.record_bounce(reason, now);
            Some(EventKind::BouncedHard)
        }
        Err(error @ SendError::CredentialsRevoked(_)) => {
            tracing::error!(
                target: "sendfleet::scheduler",
                job_id = %job.id,
                account = %account.id,
                %error,
                "credentials revoked, disabling account"
            );
            job.record_failure(error.to_string(), now);

            // Account-level fault: pull the whole account, not just
            // this job. Re-read so we don't clobber counter updates.
            match store.account(&account.id).await {
                Ok(mut fresh) => {
                    fresh.record_fault(error.to_string());
                    if let Err(persist) = store.update_account(&fresh).await {
                        tracing::error!(
                            target: "sendfleet::scheduler",
                            account = %account.id,
                            %persist,
                            "failed to persist account fault"
                        );
                    }
                }
                Err(fetch) => {
                    tracing::error!(
                        target: "sendfleet::scheduler",
                        account = %account.id,
                        %fetch,
                        "failed to load account for fault recording"
                    );
                }
            }
            None
        }
        Err(error) => {
            // InvalidRecipient / Rejected: permanent, message-scoped
            tracing::warn!(
                target: "sendfleet::scheduler",
                job_id = %job.id,
                %error,
                "permanent failure"
            );
            job.record_failure(error.to_string(), now);
            None
        }
    };

    if let Err(persist) = store.update_job(&job).await {
        tracing::error!(
            target: "sendfleet::scheduler",
            job_id = %job.id,
            %persist,
            "failed to persist job outcome"
        );
    }

    if let Some(kind) = event {
        let event = DeliveryEvent::new(job.org_id.clone(), account.id.clone(), kind)
            .for_job(job.campaign_id.clone(), job.id);
        if let Err(persist) = store.record_event(event).await {
            tracing::error!(
                target: "sendfleet::scheduler",
                job_id = %job.id,
                %persist,
                "failed to record delivery event"
            );
        }
    }
}
