//! Shared fixtures for engine integration tests

#![allow(dead_code, clippy::unwrap_used)]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use sendfleet_common::{
    AccountId, CampaignId, EmailJob, MemoryStore, OrgId, ProviderKind, SendingAccount, Store,
};
use sendfleet_delivery::{
    EnqueueRequest, MessageComposer, RateLimitConfig, Scheduler, WindowLimits,
};
use sendfleet_provider::{Channel, ChannelRegistry, OutboundMessage, SendError, SendOutcome};

/// A channel that replays a scripted error sequence, then succeeds.
///
/// Each `send` pops one scripted error; an empty script means success
/// with a generated message id. The call counter covers in-attempt
/// retries too.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    script: Mutex<VecDeque<SendError>>,
    pub calls: AtomicU32,
}

impl ScriptedChannel {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_failures(errors: Vec<SendError>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(errors.into()),
            calls: AtomicU32::new(0),
        })
    }

    /// Always fails transiently for `n` channel calls.
    pub fn transient_failures(n: usize) -> Arc<Self> {
        Self::with_failures(
            (0..n)
                .map(|_| SendError::Transient("connection reset by peer".into()))
                .collect(),
        )
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OauthWebmail
    }

    async fn send(
        &self,
        _from: &str,
        _message: &OutboundMessage,
    ) -> Result<SendOutcome, SendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.script.lock().pop_front() {
            return Err(error);
        }
        Ok(SendOutcome {
            provider_message_id: format!("msg-{call}"),
        })
    }
}

/// Renders a fixed message from the job's lead reference.
#[derive(Debug)]
pub struct StaticComposer;

#[async_trait]
impl MessageComposer for StaticComposer {
    async fn compose(&self, job: &EmailJob) -> Result<OutboundMessage, String> {
        Ok(OutboundMessage::new(
            format!("{}@example.com", job.lead_id),
            "Quick question",
            "Hi, just following up.",
        ))
    }
}

/// Always refuses to render.
#[derive(Debug)]
pub struct FailingComposer;

#[async_trait]
impl MessageComposer for FailingComposer {
    async fn compose(&self, _job: &EmailJob) -> Result<OutboundMessage, String> {
        Err("template not found".into())
    }
}

pub fn account(id: &str, daily_limit: u32) -> SendingAccount {
    SendingAccount::new(
        AccountId::new(id),
        OrgId::new("org-1"),
        format!("{id}@acmeleads.com"),
        ProviderKind::OauthWebmail,
        daily_limit,
    )
}

/// Rate limits wide open so tests exercise quota and health rules
/// without tripping the pacing windows.
pub fn open_limits() -> RateLimitConfig {
    RateLimitConfig {
        account: WindowLimits::default(),
        provider: ahash::AHashMap::default(),
    }
}

/// An initialized scheduler over `store` and `channels` with open rate
/// limits and the static composer.
pub fn engine(store: &Arc<MemoryStore>, channels: &Arc<ChannelRegistry>) -> Scheduler {
    let mut scheduler = Scheduler::default();
    scheduler.rate_limits = open_limits();
    scheduler
        .init(
            Arc::clone(store) as Arc<dyn Store>,
            Arc::clone(channels),
            Arc::new(StaticComposer),
        )
        .unwrap();
    scheduler
}

pub fn enqueue_one(lead: &str) -> EnqueueRequest {
    EnqueueRequest {
        org_id: OrgId::new("org-1"),
        campaign_id: CampaignId::new("camp-1"),
        lead_ids: vec![lead.into()],
        step_id: "step-1".into(),
        variant_id: None,
        scheduled_at: None,
        priority: None,
    }
}
