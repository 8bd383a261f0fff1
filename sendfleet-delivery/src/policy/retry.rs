//! Retry policy for transient send failures
//!
//! Each transient failure consumes one attempt and reschedules the job
//! with exponential backoff: `base * 2^attempts`, capped and jittered.
//! Jitter spreads out retries when a provider outage fails a whole batch
//! at once.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before a job is failed for good.
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay for the backoff, in seconds.
    #[serde(default = "defaults::base_retry_delay_secs")]
    pub base_retry_delay_secs: u64,

    /// Backoff ceiling, in seconds.
    #[serde(default = "defaults::max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,

    /// Randomization around the computed delay, as a fraction.
    #[serde(default = "defaults::retry_jitter_factor")]
    pub retry_jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_retry_delay_secs: defaults::base_retry_delay_secs(),
            max_retry_delay_secs: defaults::max_retry_delay_secs(),
            retry_jitter_factor: defaults::retry_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Whether a job with `attempts` consumed may try again.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Attempts left for a job with `attempts` consumed.
    #[must_use]
    pub const fn remaining_attempts(&self, attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts)
    }

    /// Backoff delay in seconds for a job whose attempt counter now
    /// stands at `attempts`, before jitter.
    #[must_use]
    pub fn backoff_secs(&self, attempts: u32) -> u64 {
        // 2^attempts, saturating well before the shift overflows
        let factor = 1u64 << attempts.min(32);
        self.base_retry_delay_secs
            .saturating_mul(factor)
            .min(self.max_retry_delay_secs)
    }

    /// When the next attempt becomes due.
    #[must_use]
    pub fn next_retry_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = self.backoff_secs(attempts);

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered = if self.retry_jitter_factor > 0.0 {
            let spread = self.retry_jitter_factor.clamp(0.0, 1.0);
            let factor = 1.0 + rand::Rng::random_range(&mut rand::rng(), -spread..=spread);
            (delay as f64 * factor).max(0.0) as i64
        } else {
            #[allow(clippy::cast_possible_wrap)]
            {
                delay as i64
            }
        };

        now + Duration::seconds(jittered)
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_retry_delay_secs() -> u64 {
        300 // 5 minutes
    }

    pub const fn max_retry_delay_secs() -> u64 {
        21600 // 6 hours
    }

    pub const fn retry_jitter_factor() -> f64 {
        0.1 // ±10%
    }
}
