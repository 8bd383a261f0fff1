//! The channel abstraction the engine sends through

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use sendfleet_common::{AccountId, ProviderKind};

use crate::{error::SendError, message::OutboundMessage};

/// Result of a successful provider send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Provider-assigned (or Message-ID-derived) identifier for the
    /// accepted message.
    pub provider_message_id: String,
}

/// One way of getting a message out the door.
///
/// A channel is bound to a single sending account's credentials; the
/// engine holds one channel per account in a [`ChannelRegistry`]. One
/// `send` call is one delivery attempt: channels never retry internally,
/// the engine's retry policy owns that decision.
#[async_trait]
pub trait Channel: Send + Sync + std::fmt::Debug {
    /// The transport family this channel speaks.
    fn kind(&self) -> ProviderKind;

    /// Perform one delivery attempt of `message` from `from`.
    async fn send(&self, from: &str, message: &OutboundMessage) -> Result<SendOutcome, SendError>;
}

/// Run one delivery attempt with a deadline.
///
/// A channel that stalls (slow provider, half-open connection) must not
/// stall the whole tick; the deadline converts the stall into a
/// retryable [`SendError::Timeout`].
pub async fn send_with_timeout(
    channel: &dyn Channel,
    from: &str,
    message: &OutboundMessage,
    deadline: Duration,
) -> Result<SendOutcome, SendError> {
    tokio::time::timeout(deadline, channel.send(from, message))
        .await
        .map_err(|_| SendError::Timeout(deadline))?
}

/// Run one job attempt: a deadline-bounded send with exactly one
/// immediate retry if the first try fails transiently.
///
/// Anything beyond that single retry is the engine's business, handled
/// through backoff rescheduling rather than hammering the provider in a
/// tight loop.
pub async fn attempt_send(
    channel: &dyn Channel,
    from: &str,
    message: &OutboundMessage,
    deadline: Duration,
) -> Result<SendOutcome, SendError> {
    match send_with_timeout(channel, from, message, deadline).await {
        Err(error) if error.is_transient() => {
            tracing::debug!(
                target: "sendfleet::provider",
                from,
                to = %message.to,
                %error,
                "transient failure, retrying within the attempt"
            );
            send_with_timeout(channel, from, message, deadline).await
        }
        outcome => outcome,
    }
}

/// Maps each sending account to its configured channel.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<AccountId, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `channel` to `account_id`, replacing any previous binding.
    pub fn register(&self, account_id: AccountId, channel: Arc<dyn Channel>) {
        self.channels.insert(account_id, channel);
    }

    /// Remove the binding for `account_id`.
    pub fn unregister(&self, account_id: &AccountId) {
        self.channels.remove(account_id);
    }

    #[must_use]
    pub fn channel(&self, account_id: &AccountId) -> Option<Arc<dyn Channel>> {
        self.channels
            .get(account_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
