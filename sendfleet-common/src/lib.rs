//! Shared vocabulary for the sendfleet outbound delivery engine
//!
//! This crate holds everything the engine and provider crates agree on:
//! typed identifiers, the job and account models with their status state
//! machines, delivery-event aggregation, and the [`Store`] trait that is
//! the engine's boundary to the product's relational storage.

pub mod account;
pub mod id;
pub mod job;
pub mod logging;
pub mod store;

pub use account::{AccountStatus, HealthStatus, ProviderKind, SendingAccount};
pub use id::{AccountId, CampaignId, JobId, OrgId};
pub use job::{EmailJob, JobStatus};
pub use store::{
    DeliveryEvent, EventCounts, EventKind, MemoryStore, ReportingWindow, Store, StoreError,
};

/// Control signal broadcast to long-running engine tasks.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
