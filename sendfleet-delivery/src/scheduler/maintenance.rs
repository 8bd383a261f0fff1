//! Account maintenance: day resets, warmup advancement, rescoring
//!
//! Runs on its own (slower) interval and is idempotent per calendar
//! day, so a crash between passes costs nothing but staleness.

use chrono::Utc;
use sendfleet_common::{HealthStatus, ReportingWindow};

use crate::{error::Result, scheduler::Scheduler, warmup};

pub(crate) async fn run(scheduler: &Scheduler) -> Result<()> {
    let store = scheduler.store()?;
    let today = Utc::now().date_naive();
    let window = ReportingWindow::last_days(scheduler.scoring.window_days);

    for mut account in store.all_accounts().await? {
        let mut changed = account.reset_daily_counter(today);
        changed |= warmup::advance(&scheduler.warmup, &mut account, today);

        let counts = store
            .event_counts(&account.org_id, Some(&account.id), None, window)
            .await?;
        let previous_status = account.health_status;
        let previous_score = account.health_score;
        let assessment = scheduler.scoring.apply(&mut account, &counts);
        changed |= account.health_score != previous_score
            || account.health_status != previous_status;

        if previous_status != HealthStatus::Critical
            && assessment.status == HealthStatus::Critical
        {
            tracing::warn!(
                target: "sendfleet::maintenance",
                account = %account.id,
                score = assessment.score,
                bounce_rate = assessment.bounce_rate,
                spam_rate = assessment.spam_rate,
                "account went critical, quarantined from rotation"
            );
        }

        if changed {
            store.update_account(&account).await?;
        }
    }

    tracing::debug!(target: "sendfleet::maintenance", %today, "maintenance pass complete");
    Ok(())
}
