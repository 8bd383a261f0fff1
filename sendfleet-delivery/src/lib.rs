//! The sendfleet outbound delivery engine
//!
//! Turns scheduled send jobs into delivered messages: the scheduler
//! drains due jobs on a tick, the selector rotates them across healthy
//! sending accounts under rate limits and warmup caps, channels perform
//! the provider sends, and the scorer feeds deliverability signals back
//! into rotation decisions.
//!
//! Embedding sketch:
//!
//! ```ignore
//! let mut scheduler = Scheduler::default();
//! scheduler.init(store, channels, composer)?;
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//! scheduler.serve(shutdown_rx).await?;
//! ```

pub mod api;
pub mod error;
pub mod policy;
pub mod rate_limit;
pub mod scheduler;
pub mod scorer;
pub mod selector;
pub mod warmup;

pub use api::{
    AccountDeliverability, CancelScope, DeliverabilityReport, EnqueueRequest, QueueStats,
};
pub use error::EngineError;
pub use policy::RetryPolicy;
pub use rate_limit::{RateLimitConfig, RateLimiter, WindowLimits};
pub use scheduler::{MessageComposer, Scheduler};
pub use scorer::{Assessment, ScoringConfig};
pub use warmup::{WarmupConfig, WarmupPhase, WarmupStep};
