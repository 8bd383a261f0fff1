//! Warmup ramp for new sending accounts
//!
//! A fresh mailbox that starts blasting full volume gets flagged by
//! receiving systems. The ramp caps a warming account's effective daily
//! limit along a curve of calendar days, and carries the reply-rate
//! target the surrounding product uses to seed engagement. The curve is
//! data, not code: configurable, validated fail-fast at engine init.

use chrono::NaiveDate;
use sendfleet_common::{AccountStatus, SendingAccount};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One point on the ramp. Applies from `day` (1-based, calendar days
/// since warmup start) until the next step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarmupStep {
    pub day: u32,
    pub daily_limit: u32,
    /// Fraction of warmup sends that should receive a seeded reply.
    pub reply_rate: f64,
}

const fn default_duration_days() -> u32 {
    14
}

fn default_curve() -> Vec<WarmupStep> {
    vec![
        WarmupStep { day: 1, daily_limit: 5, reply_rate: 1.0 },
        WarmupStep { day: 4, daily_limit: 15, reply_rate: 0.8 },
        WarmupStep { day: 8, daily_limit: 30, reply_rate: 0.6 },
        WarmupStep { day: 14, daily_limit: 40, reply_rate: 0.4 },
        WarmupStep { day: 21, daily_limit: 40, reply_rate: 0.3 },
    ]
}

/// Ramp configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    /// Calendar days until an account graduates from the ramp.
    #[serde(default = "default_duration_days")]
    pub duration_days: u32,

    /// The ramp itself, ordered by `day`.
    #[serde(default = "default_curve")]
    pub curve: Vec<WarmupStep>,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            duration_days: default_duration_days(),
            curve: default_curve(),
        }
    }
}

/// Where an account stands on the ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupPhase {
    NotStarted,
    InProgress,
    /// Account paused mid-ramp; calendar days keep counting.
    Paused,
    Completed,
}

impl WarmupConfig {
    /// Reject malformed curves before the engine starts scheduling
    /// against them.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.duration_days == 0 {
            return Err(EngineError::Config("warmup duration must be at least one day".into()));
        }
        if self.curve.is_empty() {
            return Err(EngineError::Config("warmup curve must have at least one step".into()));
        }

        let mut previous: Option<&WarmupStep> = None;
        for step in &self.curve {
            if step.day == 0 {
                return Err(EngineError::Config("warmup curve days are 1-based".into()));
            }
            if !(0.0..=1.0).contains(&step.reply_rate) {
                return Err(EngineError::Config(format!(
                    "reply rate {} on day {} is outside [0, 1]",
                    step.reply_rate, step.day
                )));
            }
            if let Some(prev) = previous {
                if step.day <= prev.day {
                    return Err(EngineError::Config(format!(
                        "warmup curve days must be strictly increasing (day {} follows {})",
                        step.day, prev.day
                    )));
                }
                if step.daily_limit < prev.daily_limit {
                    return Err(EngineError::Config(format!(
                        "warmup limits may not decrease (day {} drops to {})",
                        step.day, step.daily_limit
                    )));
                }
                if step.reply_rate > prev.reply_rate {
                    return Err(EngineError::Config(format!(
                        "reply rates may not increase along the ramp (day {})",
                        step.day
                    )));
                }
            }
            previous = Some(step);
        }

        Ok(())
    }

    /// The step in effect on `day_index` (1-based). Days before the
    /// first step use the first step; days past the last plateau there.
    #[must_use]
    pub fn step_for_day(&self, day_index: u32) -> &WarmupStep {
        self.curve
            .iter()
            .rev()
            .find(|step| step.day <= day_index)
            .unwrap_or(&self.curve[0])
    }

    /// Ramp-capped daily limit: the account's own limit never rises,
    /// only tightens.
    #[must_use]
    pub fn effective_daily_limit(&self, account_limit: u32, day_index: u32) -> u32 {
        account_limit.min(self.step_for_day(day_index).daily_limit)
    }

    /// Seeded-reply target for the day. Informational only.
    #[must_use]
    pub fn reply_injection_target(&self, day_index: u32) -> f64 {
        self.step_for_day(day_index).reply_rate
    }

    /// Ramp completion percentage, capped at 100.
    #[must_use]
    pub fn progress(&self, day_index: u32) -> u8 {
        let pct = u64::from(day_index) * 100 / u64::from(self.duration_days);
        u8::try_from(pct.min(100)).unwrap_or(100)
    }

    #[must_use]
    pub const fn is_complete(&self, day_index: u32) -> bool {
        day_index >= self.duration_days
    }
}

/// 1-based calendar day of the ramp. The start date itself is day 1.
#[must_use]
pub fn day_index(started_on: NaiveDate, today: NaiveDate) -> u32 {
    let elapsed = (today - started_on).num_days();
    u32::try_from(elapsed.max(0)).unwrap_or(u32::MAX).saturating_add(1)
}

/// Which phase the ramp is in for `account`.
#[must_use]
pub fn phase(account: &SendingAccount) -> WarmupPhase {
    if account.warmup_enabled {
        if account.status == AccountStatus::Paused {
            WarmupPhase::Paused
        } else {
            WarmupPhase::InProgress
        }
    } else if account.warmup_progress >= 100 {
        WarmupPhase::Completed
    } else {
        WarmupPhase::NotStarted
    }
}

/// Advance `account` along the ramp for `today`.
///
/// Idempotent for a given date. Returns `true` if the account mutated.
pub fn advance(config: &WarmupConfig, account: &mut SendingAccount, today: NaiveDate) -> bool {
    if !account.warmup_enabled {
        return false;
    }
    let Some(started_on) = account.warmup_started_on else {
        return false;
    };

    let day = day_index(started_on, today);
    let progress = config.progress(day);
    let mut changed = account.warmup_progress != progress;
    account.warmup_progress = progress;

    if config.is_complete(day) {
        account.warmup_enabled = false;
        if account.status == AccountStatus::Warming {
            account.status = AccountStatus::Active;
        }
        changed = true;
        tracing::info!(
            target: "sendfleet::warmup",
            account = %account.id,
            day,
            "warmup complete, account graduated"
        );
    }

    changed
}
