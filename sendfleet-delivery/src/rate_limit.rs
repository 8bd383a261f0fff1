//! Multi-window send admission control
//!
//! Every send must reserve capacity before the provider call. A
//! reservation checks fixed windows (second/minute/hour/day) at two
//! scopes, the sending account and its provider kind, and commits to all
//! of them only if every check passes. Failed sends are not refunded:
//! the provider saw traffic either way.
//!
//! Sub-day windows are self-expiring fixed buckets keyed by
//! `timestamp / width`; the day window rolls over at the UTC date
//! boundary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sendfleet_common::{AccountId, ProviderKind};
use serde::{Deserialize, Serialize};

/// Caps per fixed window. `None` leaves that window unchecked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowLimits {
    #[serde(default)]
    pub max_per_second: Option<u32>,

    #[serde(default)]
    pub max_per_minute: Option<u32>,

    #[serde(default)]
    pub max_per_hour: Option<u32>,

    #[serde(default)]
    pub max_per_day: Option<u32>,
}

const fn default_account_limits() -> WindowLimits {
    // Cold outreach paces like a human: one send a second, short bursts
    // per minute, a sustainable hourly clip. The daily cap lives on the
    // account itself.
    WindowLimits {
        max_per_second: Some(1),
        max_per_minute: Some(6),
        max_per_hour: Some(40),
        max_per_day: None,
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Windows applied to every sending account.
    #[serde(default = "default_account_limits")]
    pub account: WindowLimits,

    /// Windows applied per provider kind, keyed by its kebab-case name
    /// (`oauth-webmail`, `protocol-relay`). Absent means unchecked.
    #[serde(default)]
    pub provider: ahash::AHashMap<String, WindowLimits>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            account: default_account_limits(),
            provider: ahash::AHashMap::default(),
        }
    }
}

/// One fixed window: a bucket id and the count inside it.
#[derive(Debug, Default, Clone, Copy)]
struct Window {
    bucket: i64,
    count: u32,
}

impl Window {
    fn roll(&mut self, bucket: i64) {
        if self.bucket != bucket {
            self.bucket = bucket;
            self.count = 0;
        }
    }
}

/// Live counters for one scope (account or provider).
#[derive(Debug, Default)]
struct WindowCounters {
    second: Window,
    minute: Window,
    hour: Window,
    day: Window,
}

impl WindowCounters {
    /// Expire any window whose bucket has rolled past.
    fn roll(&mut self, now: DateTime<Utc>) {
        let ts = now.timestamp();
        self.second.roll(ts);
        self.minute.roll(ts.div_euclid(60));
        self.hour.roll(ts.div_euclid(3600));
        // UTC date boundary
        self.day.roll(ts.div_euclid(86_400));
    }

    fn admits(&self, limits: &WindowLimits) -> bool {
        let within = |count: u32, limit: Option<u32>| limit.is_none_or(|max| count < max);

        within(self.second.count, limits.max_per_second)
            && within(self.minute.count, limits.max_per_minute)
            && within(self.hour.count, limits.max_per_hour)
            && within(self.day.count, limits.max_per_day)
    }

    fn commit(&mut self) {
        self.second.count += 1;
        self.minute.count += 1;
        self.hour.count += 1;
        self.day.count += 1;
    }
}

/// Admission control across all accounts and providers.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    accounts: DashMap<AccountId, Arc<parking_lot::Mutex<WindowCounters>>>,
    providers: DashMap<ProviderKind, Arc<parking_lot::Mutex<WindowCounters>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            accounts: DashMap::new(),
            providers: DashMap::new(),
        }
    }

    fn account_counters(&self, id: &AccountId) -> Arc<parking_lot::Mutex<WindowCounters>> {
        self.accounts
            .entry(id.clone())
            .or_insert_with(|| Arc::new(parking_lot::Mutex::new(WindowCounters::default())))
            .clone()
    }

    fn provider_counters(&self, kind: ProviderKind) -> Arc<parking_lot::Mutex<WindowCounters>> {
        self.providers
            .entry(kind)
            .or_insert_with(|| Arc::new(parking_lot::Mutex::new(WindowCounters::default())))
            .clone()
    }

    /// Reserve one send slot for `account_id` on `provider`.
    ///
    /// Checks every window at both scopes and increments all of them
    /// only if every check passes. A refusal leaves every counter
    /// untouched.
    pub fn reserve(&self, account_id: &AccountId, provider: ProviderKind) -> bool {
        self.reserve_at(account_id, provider, Utc::now())
    }

    /// [`Self::reserve`] with an injected clock.
    pub fn reserve_at(
        &self,
        account_id: &AccountId,
        provider: ProviderKind,
        now: DateTime<Utc>,
    ) -> bool {
        let account_counters = self.account_counters(account_id);
        let provider_counters = self.provider_counters(provider);

        // Fixed lock order: account shard, then provider shard
        let mut account = account_counters.lock();
        let mut provider_scope = provider_counters.lock();

        account.roll(now);
        provider_scope.roll(now);

        if !account.admits(&self.config.account) {
            tracing::debug!(target: "sendfleet::rate_limit", account = %account_id, "account window exhausted");
            return false;
        }

        let provider_limits = self.config.provider.get(&provider.to_string());
        if let Some(limits) = provider_limits
            && !provider_scope.admits(limits)
        {
            tracing::debug!(target: "sendfleet::rate_limit", %provider, "provider window exhausted");
            return false;
        }

        account.commit();
        if provider_limits.is_some() {
            provider_scope.commit();
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(account: WindowLimits) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            account,
            provider: ahash::AHashMap::default(),
        })
    }

    #[test]
    fn per_second_window_refuses_then_rolls() {
        let limiter = limiter(WindowLimits {
            max_per_second: Some(1),
            ..Default::default()
        });
        let account = AccountId::new("acct-1");
        let now = Utc::now();

        assert!(limiter.reserve_at(&account, ProviderKind::OauthWebmail, now));
        assert!(!limiter.reserve_at(&account, ProviderKind::OauthWebmail, now));

        // The next second is a fresh bucket
        let next = now + chrono::Duration::seconds(1);
        assert!(limiter.reserve_at(&account, ProviderKind::OauthWebmail, next));
    }

    #[test]
    fn refusal_is_all_or_nothing() {
        let limiter = limiter(WindowLimits {
            max_per_second: Some(1),
            max_per_minute: Some(3),
            ..Default::default()
        });
        let account = AccountId::new("acct-1");
        let now = Utc::now();

        assert!(limiter.reserve_at(&account, ProviderKind::OauthWebmail, now));
        // Second-window refusal must not consume minute capacity
        for _ in 0..5 {
            assert!(!limiter.reserve_at(&account, ProviderKind::OauthWebmail, now));
        }

        let later = now + chrono::Duration::seconds(1);
        assert!(limiter.reserve_at(&account, ProviderKind::OauthWebmail, later));
        let later = later + chrono::Duration::seconds(1);
        assert!(limiter.reserve_at(&account, ProviderKind::OauthWebmail, later));

        // Minute window is now full
        let later = later + chrono::Duration::seconds(1);
        assert!(!limiter.reserve_at(&account, ProviderKind::OauthWebmail, later));
    }

    #[test]
    fn accounts_do_not_share_windows() {
        let limiter = limiter(WindowLimits {
            max_per_second: Some(1),
            ..Default::default()
        });
        let now = Utc::now();

        assert!(limiter.reserve_at(&AccountId::new("a"), ProviderKind::OauthWebmail, now));
        assert!(limiter.reserve_at(&AccountId::new("b"), ProviderKind::OauthWebmail, now));
        assert!(!limiter.reserve_at(&AccountId::new("a"), ProviderKind::OauthWebmail, now));
    }

    #[test]
    fn provider_window_spans_accounts() {
        let mut provider = ahash::AHashMap::default();
        provider.insert(
            ProviderKind::OauthWebmail.to_string(),
            WindowLimits {
                max_per_second: Some(2),
                ..Default::default()
            },
        );
        let limiter = RateLimiter::new(RateLimitConfig {
            account: WindowLimits::default(),
            provider,
        });
        let now = Utc::now();

        assert!(limiter.reserve_at(&AccountId::new("a"), ProviderKind::OauthWebmail, now));
        assert!(limiter.reserve_at(&AccountId::new("b"), ProviderKind::OauthWebmail, now));
        // Third send this second is refused no matter the account
        assert!(!limiter.reserve_at(&AccountId::new("c"), ProviderKind::OauthWebmail, now));
        // The other provider kind has its own scope
        assert!(limiter.reserve_at(&AccountId::new("c"), ProviderKind::ProtocolRelay, now));
    }

    #[test]
    fn day_window_resets_on_utc_date_rollover() {
        let limiter = limiter(WindowLimits {
            max_per_day: Some(1),
            ..Default::default()
        });
        let account = AccountId::new("acct-1");
        let just_before_midnight = chrono::DateTime::parse_from_rfc3339("2026-08-23T23:59:59Z")
            .unwrap_or_default()
            .with_timezone(&Utc);

        assert!(limiter.reserve_at(&account, ProviderKind::OauthWebmail, just_before_midnight));
        assert!(!limiter.reserve_at(&account, ProviderKind::OauthWebmail, just_before_midnight));

        let just_after = just_before_midnight + chrono::Duration::seconds(1);
        assert!(limiter.reserve_at(&account, ProviderKind::OauthWebmail, just_after));
    }
}
