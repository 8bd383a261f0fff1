//! The `SendingAccount` model
//!
//! An account is one mailbox capable of sending, with its own daily
//! quota, warmup state, and reputation. Counters are mutated by the
//! scheduler, warmup fields by the ramp, and health fields by the scorer.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AccountId, OrgId};

/// Transport family a mailbox sends through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// OAuth-authenticated webmail API (Google Workspace, Microsoft 365).
    OauthWebmail,
    /// Protocol-level mail relay (SMTP submission).
    ProtocolRelay,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OauthWebmail => "oauth-webmail",
            Self::ProtocolRelay => "protocol-relay",
        };
        write!(f, "{s}")
    }
}

/// Operational status of a sending account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Fully ramped and eligible for sends.
    Active,
    /// Manually paused; never selected.
    Paused,
    /// Account-level fault (revoked credentials); needs operator action.
    Error,
    /// Inside the warmup ramp; eligible for sends at a reduced cap.
    Warming,
}

/// Health classification derived from the deliverability score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    /// Quarantined: the selector never picks a critical account.
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// A sending mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendingAccount {
    pub id: AccountId,
    pub org_id: OrgId,
    /// Sender address, e.g. `jane@acmeleads.com`.
    pub email: Arc<str>,
    pub provider: ProviderKind,
    pub status: AccountStatus,
    /// Configured ceiling on sends per day.
    pub daily_limit: u32,
    /// Sends counted against today's quota; reset once per day boundary.
    pub sent_today: u32,
    pub warmup_enabled: bool,
    /// Ramp completion, 0–100.
    pub warmup_progress: u8,
    /// First day of the warmup ramp.
    pub warmup_started_on: Option<NaiveDate>,
    /// Deliverability score, 0–100.
    pub health_score: u8,
    pub health_status: HealthStatus,
    pub last_error: Option<String>,
    /// Recency marker driving round-robin selection.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Idempotency key for the day-boundary counter reset.
    pub last_reset_on: Option<NaiveDate>,
}

impl SendingAccount {
    /// Create an active account with a full health score and no history.
    #[must_use]
    pub fn new(
        id: AccountId,
        org_id: OrgId,
        email: impl Into<Arc<str>>,
        provider: ProviderKind,
        daily_limit: u32,
    ) -> Self {
        Self {
            id,
            org_id,
            email: email.into(),
            provider,
            status: AccountStatus::Active,
            daily_limit,
            sent_today: 0,
            warmup_enabled: false,
            warmup_progress: 0,
            warmup_started_on: None,
            health_score: 100,
            health_status: HealthStatus::Healthy,
            last_error: None,
            last_used_at: None,
            last_reset_on: None,
        }
    }

    /// Whether the selector may consider this account at all.
    ///
    /// Warming accounts are eligible: warmup lowers the cap, it does not
    /// forbid real mail.
    #[must_use]
    pub const fn is_sendable(&self) -> bool {
        matches!(self.status, AccountStatus::Active | AccountStatus::Warming)
    }

    /// Reset the daily counter for `today`.
    ///
    /// Idempotent: running it twice on the same day is a no-op, so the
    /// maintenance task may be retried safely after a crash. An account
    /// that has never been reset only gets its key stamped; its counter
    /// already belongs to today.
    pub fn reset_daily_counter(&mut self, today: NaiveDate) -> bool {
        match self.last_reset_on {
            Some(last) if last == today => false,
            Some(_) => {
                self.sent_today = 0;
                self.last_reset_on = Some(today);
                true
            }
            None => {
                self.last_reset_on = Some(today);
                true
            }
        }
    }

    /// Record an account-level fault and take the account out of rotation.
    pub fn record_fault(&mut self, error: impl Into<String>) {
        self.status = AccountStatus::Error;
        self.last_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> SendingAccount {
        SendingAccount::new(
            AccountId::new("acct-1"),
            OrgId::new("org-1"),
            "jane@acmeleads.com",
            ProviderKind::OauthWebmail,
            50,
        )
    }

    #[test]
    fn new_account_is_innocent_until_proven_guilty() {
        let account = account();
        assert_eq!(account.health_score, 100);
        assert_eq!(account.health_status, HealthStatus::Healthy);
        assert!(account.is_sendable());
    }

    #[test]
    fn warming_accounts_are_sendable() {
        let mut account = account();
        account.status = AccountStatus::Warming;
        assert!(account.is_sendable());

        account.status = AccountStatus::Paused;
        assert!(!account.is_sendable());
        account.status = AccountStatus::Error;
        assert!(!account.is_sendable());
    }

    #[test]
    fn daily_reset_is_idempotent() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap_or_default();
        let mut account = account();
        account.last_reset_on = today.pred_opt();
        account.sent_today = 37;

        assert!(account.reset_daily_counter(today));
        assert_eq!(account.sent_today, 0);

        account.sent_today = 5;
        // Second run on the same day must not touch the counter
        assert!(!account.reset_daily_counter(today));
        assert_eq!(account.sent_today, 5);

        let tomorrow = today.succ_opt().unwrap_or(today);
        assert!(account.reset_daily_counter(tomorrow));
        assert_eq!(account.sent_today, 0);
    }

    #[test]
    fn first_reset_keeps_same_day_sends() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap_or_default();
        let mut account = account();
        account.sent_today = 5;
        assert_eq!(account.last_reset_on, None);

        // A brand-new account's counter already belongs to today; the
        // first pass only stamps the key.
        assert!(account.reset_daily_counter(today));
        assert_eq!(account.sent_today, 5);
        assert_eq!(account.last_reset_on, Some(today));

        assert!(!account.reset_daily_counter(today));
        assert_eq!(account.sent_today, 5);

        let tomorrow = today.succ_opt().unwrap_or(today);
        assert!(account.reset_daily_counter(tomorrow));
        assert_eq!(account.sent_today, 0);
    }

    #[test]
    fn fault_takes_account_out_of_rotation() {
        let mut account = account();
        account.record_fault("credentials revoked");
        assert_eq!(account.status, AccountStatus::Error);
        assert_eq!(account.last_error.as_deref(), Some("credentials revoked"));
        assert!(!account.is_sendable());
    }
}
