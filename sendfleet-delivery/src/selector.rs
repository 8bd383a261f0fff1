//! Account rotation
//!
//! Picks the sending account for one job: least-recently-used among the
//! eligible pool, with the rate limiter getting the final word. A
//! refused reservation drops the candidate and moves on; an empty pool
//! means "try the job again later", never an error.

use chrono::{DateTime, NaiveDate, Utc};
use sendfleet_common::{HealthStatus, SendingAccount};

use crate::{rate_limit::RateLimiter, warmup::{self, WarmupConfig}};

/// Today's send ceiling for `account`: the configured daily limit,
/// tightened by the ramp while warming.
#[must_use]
pub fn effective_daily_limit(
    account: &SendingAccount,
    warmup_config: &WarmupConfig,
    today: NaiveDate,
) -> u32 {
    match account.warmup_started_on {
        Some(started_on) if account.warmup_enabled => {
            let day = warmup::day_index(started_on, today);
            warmup_config.effective_daily_limit(account.daily_limit, day)
        }
        _ => account.daily_limit,
    }
}

/// Whether `account` may be considered for a send right now.
#[must_use]
pub fn is_eligible(
    account: &SendingAccount,
    warmup_config: &WarmupConfig,
    today: NaiveDate,
) -> bool {
    account.is_sendable()
        && account.health_status != HealthStatus::Critical
        && account.sent_today < effective_daily_limit(account, warmup_config, today)
}

/// Select a sending account from `pool`.
///
/// Candidates are ordered oldest-used first (never-used before all),
/// ties broken by account id for determinism. The first candidate that
/// clears a rate-limit reservation wins; the reservation is already
/// committed when this returns.
#[must_use]
pub fn select_account(
    pool: &[SendingAccount],
    warmup_config: &WarmupConfig,
    limiter: &RateLimiter,
    now: DateTime<Utc>,
) -> Option<SendingAccount> {
    let today = now.date_naive();

    let mut candidates: Vec<&SendingAccount> = pool
        .iter()
        .filter(|account| is_eligible(account, warmup_config, today))
        .collect();

    // None sorts before Some, so never-used accounts go first
    candidates.sort_by(|a, b| {
        a.last_used_at
            .cmp(&b.last_used_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    for candidate in candidates {
        if limiter.reserve_at(&candidate.id, candidate.provider, now) {
            return Some(candidate.clone());
        }
        tracing::trace!(
            target: "sendfleet::selector",
            account = %candidate.id,
            "reservation refused, trying next candidate"
        );
    }

    None
}
