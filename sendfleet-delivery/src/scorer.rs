//! Deliverability scoring
//!
//! A pure function from windowed event counts to a 0-100 score and a
//! health classification. The selector quarantines `Critical` accounts;
//! the product surfaces the score and remediation list per account.
//!
//! Rates are percentages of sends: 1 complaint in 100 sends is a spam
//! rate of 1.0.

use sendfleet_common::{EventCounts, HealthStatus, SendingAccount};
use serde::{Deserialize, Serialize};

const fn default_critical_score() -> u8 {
    50
}

const fn default_warning_score() -> u8 {
    70
}

const fn default_warning_bounce_rate() -> f64 {
    5.0
}

const fn default_critical_spam_rate() -> f64 {
    0.5
}

const fn default_window_days() -> i64 {
    30
}

/// Scoring thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Score below this is `Critical`.
    #[serde(default = "default_critical_score")]
    pub critical_score: u8,

    /// Score below this is `Warning`.
    #[serde(default = "default_warning_score")]
    pub warning_score: u8,

    /// Bounce rate (percent) above this is `Warning`.
    #[serde(default = "default_warning_bounce_rate")]
    pub warning_bounce_rate: f64,

    /// Spam-complaint rate (percent) above this is `Critical`.
    #[serde(default = "default_critical_spam_rate")]
    pub critical_spam_rate: f64,

    /// How many days of events the rolling assessment looks at.
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            critical_score: default_critical_score(),
            warning_score: default_warning_score(),
            warning_bounce_rate: default_warning_bounce_rate(),
            critical_spam_rate: default_critical_spam_rate(),
            window_days: default_window_days(),
        }
    }
}

/// The scorer's verdict on one set of counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub score: u8,
    pub status: HealthStatus,
    /// Bounces per hundred sends.
    pub bounce_rate: f64,
    /// Complaints per hundred sends.
    pub spam_rate: f64,
}

impl ScoringConfig {
    /// Score `counts`. An account that has never sent is healthy by
    /// definition.
    #[must_use]
    pub fn assess(&self, counts: &EventCounts) -> Assessment {
        let bounce_rate = counts.bounce_rate().unwrap_or(0.0);
        let spam_rate = counts.spam_rate().unwrap_or(0.0);

        // Complaints hurt much more than bounces
        let raw = (spam_rate * 5.0).mul_add(-1.0, (bounce_rate * 2.0).mul_add(-1.0, 100.0));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let score = raw.clamp(0.0, 100.0).round() as u8;

        // Critical outranks warning; threshold order is load-bearing
        let status = if score < self.critical_score || spam_rate > self.critical_spam_rate {
            HealthStatus::Critical
        } else if score < self.warning_score || bounce_rate > self.warning_bounce_rate {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        Assessment {
            score,
            status,
            bounce_rate,
            spam_rate,
        }
    }

    /// Deterministic remediation list for an assessment, most urgent
    /// first. Empty for healthy accounts.
    #[must_use]
    pub fn recommendations(&self, assessment: &Assessment) -> Vec<String> {
        let mut out = Vec::new();

        if assessment.spam_rate > self.critical_spam_rate {
            out.push(format!(
                "Spam complaint rate {:.2}% exceeds {:.2}%: pause this account and review targeting and copy",
                assessment.spam_rate, self.critical_spam_rate
            ));
        }
        if assessment.score < self.critical_score {
            out.push(format!(
                "Deliverability score {} is below {}: stop sending and re-warm the account",
                assessment.score, self.critical_score
            ));
        }
        if assessment.bounce_rate > self.warning_bounce_rate {
            out.push(format!(
                "Bounce rate {:.2}% exceeds {:.2}%: verify lead lists before sending",
                assessment.bounce_rate, self.warning_bounce_rate
            ));
        }
        if assessment.score < self.warning_score {
            out.push(format!(
                "Deliverability score {} is below {}: reduce daily volume until it recovers",
                assessment.score, self.warning_score
            ));
        }

        out
    }

    /// Fold an assessment into the account's persisted health fields.
    pub fn apply(&self, account: &mut SendingAccount, counts: &EventCounts) -> Assessment {
        let assessment = self.assess(counts);
        account.health_score = assessment.score;
        account.health_status = assessment.status;
        assessment
    }
}
