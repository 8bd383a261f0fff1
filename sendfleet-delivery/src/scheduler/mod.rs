//! The delivery scheduler
//!
//! Owns the tick loop that drains due jobs through provider channels and
//! the maintenance loop that keeps account state honest (day-boundary
//! resets, warmup advancement, health rescoring). Configuration
//! deserializes from the process config file; runtime collaborators
//! (store, channels, composer) arrive in [`Scheduler::init`].

pub mod maintenance;
pub mod tick;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sendfleet_common::{EmailJob, Signal, Store};
use sendfleet_provider::{ChannelRegistry, OutboundMessage};
use serde::Deserialize;

use crate::{
    error::{EngineError, Result},
    policy::RetryPolicy,
    rate_limit::{RateLimitConfig, RateLimiter},
    scorer::ScoringConfig,
    warmup::WarmupConfig,
};

const fn default_tick_interval() -> u64 {
    15
}

const fn default_maintenance_interval() -> u64 {
    300
}

const fn default_batch_size() -> usize {
    50
}

const fn default_max_concurrent_sends() -> usize {
    8
}

const fn default_send_timeout() -> u64 {
    30
}

const fn default_no_capacity_delay() -> u64 {
    900 // 15 minutes
}

/// Turns a claimed job into the message to send.
///
/// Rendering lives with the product (templates, personalization, variant
/// copy); the engine only knows the job's lead/step/variant references.
/// A compose error fails the job permanently without consuming a send
/// attempt budget entry at the provider.
#[async_trait]
pub trait MessageComposer: Send + Sync + std::fmt::Debug {
    async fn compose(&self, job: &EmailJob) -> std::result::Result<OutboundMessage, String>;
}

/// Scheduler configuration plus runtime state.
#[derive(Debug, Deserialize)]
pub struct Scheduler {
    /// How often to drain due jobs (in seconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// How often to run account maintenance (in seconds).
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    /// Most jobs claimed per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Provider sends in flight at once within a tick.
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,

    /// Deadline for one provider send attempt (in seconds).
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// How long a job waits when no account has capacity (in seconds).
    /// Capacity misses do not consume attempts.
    #[serde(default = "default_no_capacity_delay")]
    pub no_capacity_delay_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub warmup: WarmupConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Storage boundary (initialized in `init()`).
    #[serde(skip)]
    store: Option<Arc<dyn Store>>,

    /// Per-account provider channels (initialized in `init()`).
    #[serde(skip)]
    channels: Option<Arc<ChannelRegistry>>,

    /// Message rendering boundary (initialized in `init()`).
    #[serde(skip)]
    composer: Option<Arc<dyn MessageComposer>>,

    /// Admission control (built in `init()` from `rate_limits`).
    #[serde(skip)]
    limiter: Option<Arc<RateLimiter>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            maintenance_interval_secs: default_maintenance_interval(),
            batch_size: default_batch_size(),
            max_concurrent_sends: default_max_concurrent_sends(),
            send_timeout_secs: default_send_timeout(),
            no_capacity_delay_secs: default_no_capacity_delay(),
            retry: RetryPolicy::default(),
            rate_limits: RateLimitConfig::default(),
            warmup: WarmupConfig::default(),
            scoring: ScoringConfig::default(),
            store: None,
            channels: None,
            composer: None,
            limiter: None,
        }
    }
}

impl Scheduler {
    /// Wire up runtime collaborators and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the warmup curve is malformed;
    /// nothing is scheduled against a bad curve.
    pub fn init(
        &mut self,
        store: Arc<dyn Store>,
        channels: Arc<ChannelRegistry>,
        composer: Arc<dyn MessageComposer>,
    ) -> Result<()> {
        self.warmup.validate()?;
        if self.max_concurrent_sends == 0 {
            return Err(EngineError::Config(
                "max_concurrent_sends must be at least 1".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(EngineError::Config("batch_size must be at least 1".into()));
        }

        self.store = Some(store);
        self.channels = Some(channels);
        self.composer = Some(composer);
        self.limiter = Some(Arc::new(RateLimiter::new(self.rate_limits.clone())));

        tracing::info!(
            target: "sendfleet::scheduler",
            tick_interval_secs = self.tick_interval_secs,
            batch_size = self.batch_size,
            max_concurrent_sends = self.max_concurrent_sends,
            "scheduler initialized"
        );

        Ok(())
    }

    pub(crate) fn store(&self) -> Result<&Arc<dyn Store>> {
        self.store
            .as_ref()
            .ok_or_else(|| EngineError::NotInitialized("store not wired, call init() first".into()))
    }

    pub(crate) fn channels(&self) -> Result<&Arc<ChannelRegistry>> {
        self.channels.as_ref().ok_or_else(|| {
            EngineError::NotInitialized("channel registry not wired, call init() first".into())
        })
    }

    pub(crate) fn composer(&self) -> Result<&Arc<dyn MessageComposer>> {
        self.composer.as_ref().ok_or_else(|| {
            EngineError::NotInitialized("composer not wired, call init() first".into())
        })
    }

    pub(crate) fn limiter(&self) -> Result<&Arc<RateLimiter>> {
        self.limiter.as_ref().ok_or_else(|| {
            EngineError::NotInitialized("rate limiter not built, call init() first".into())
        })
    }

    /// Drain one batch of due jobs now. Exposed for embedding and tests;
    /// [`Scheduler::serve`] calls this on the tick interval.
    ///
    /// Returns the number of sends dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error only for store faults or a missing `init()`.
    pub async fn run_tick(&self) -> Result<usize> {
        tick::run(self).await
    }

    /// Run one maintenance pass now. Idempotent per calendar day.
    ///
    /// # Errors
    ///
    /// Returns an error only for store faults or a missing `init()`.
    pub async fn run_maintenance(&self) -> Result<()> {
        maintenance::run(self).await
    }

    /// Run the scheduler until a shutdown signal arrives.
    ///
    /// Tick and maintenance share one task, so a tick is never
    /// re-entered: the next timer fire waits for the previous arm to
    /// finish. In-flight sends complete before the tick arm returns,
    /// which also makes shutdown a clean drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler was not initialized.
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<()> {
        // Fail fast before the first tick
        let _ = self.store()?;
        let _ = self.channels()?;
        let _ = self.composer()?;

        let mut tick_timer = tokio::time::interval(Duration::from_secs(self.tick_interval_secs));
        let mut maintenance_timer =
            tokio::time::interval(Duration::from_secs(self.maintenance_interval_secs));

        // Skip the immediate first fire
        tick_timer.tick().await;
        maintenance_timer.tick().await;

        tracing::info!(target: "sendfleet::scheduler", "scheduler serving");

        loop {
            tokio::select! {
                _ = tick_timer.tick() => {
                    match self.run_tick().await {
                        Ok(0) => {
                            tracing::trace!(target: "sendfleet::scheduler", "tick: nothing due");
                        }
                        Ok(dispatched) => {
                            tracing::debug!(target: "sendfleet::scheduler", dispatched, "tick complete");
                        }
                        Err(error) => {
                            tracing::error!(target: "sendfleet::scheduler", %error, "tick failed");
                        }
                    }
                }
                _ = maintenance_timer.tick() => {
                    if let Err(error) = self.run_maintenance().await {
                        tracing::error!(target: "sendfleet::scheduler", %error, "maintenance failed");
                    }
                }
                signal = shutdown.recv() => {
                    match signal {
                        Ok(Signal::Shutdown) => {
                            tracing::info!(target: "sendfleet::scheduler", "shutdown signal received, draining");
                            break;
                        }
                        Err(error) => {
                            tracing::error!(target: "sendfleet::scheduler", %error, "shutdown channel closed");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!(target: "sendfleet::scheduler", "scheduler stopped");
        Ok(())
    }
}
