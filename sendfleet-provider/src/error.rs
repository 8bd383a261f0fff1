use std::time::Duration;

/// Outcome taxonomy for a single provider send attempt.
///
/// The engine keys its retry and health decisions off these variants:
/// transient failures are retried with backoff, hard bounces terminate
/// the job and count against the account's reputation, and revoked
/// credentials take the whole account out of rotation.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    /// Retryable failure: connection trouble, throttling, 4xx replies.
    #[error("Transient send failure: {0}")]
    Transient(String),

    /// The attempt exceeded its deadline. Retryable.
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    /// The receiving system permanently rejected this recipient.
    #[error("Recipient hard-bounced: {0}")]
    HardBounce(String),

    /// The recipient address is malformed or unroutable.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The provider refused the message itself (policy, size, content).
    #[error("Message rejected by provider: {0}")]
    Rejected(String),

    /// Authentication failed in a way a retry cannot fix.
    #[error("Credentials revoked: {0}")]
    CredentialsRevoked(String),
}

impl SendError {
    /// Whether a later attempt could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }

    /// Whether this failure should be charged to the account's
    /// reputation as a hard bounce.
    #[must_use]
    pub const fn is_hard_bounce(&self) -> bool {
        matches!(self, Self::HardBounce(_))
    }
}

impl From<std::io::Error> for SendError {
    fn from(error: std::io::Error) -> Self {
        Self::Transient(error.to_string())
    }
}

impl From<reqwest::Error> for SendError {
    fn from(error: reqwest::Error) -> Self {
        // Connection-level HTTP failures are always worth a retry
        Self::Transient(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(SendError::Transient("451 try again".into()).is_transient());
        assert!(SendError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(!SendError::HardBounce("550 no such user".into()).is_transient());
        assert!(!SendError::CredentialsRevoked("535".into()).is_transient());
        assert!(SendError::HardBounce("550".into()).is_hard_bounce());
        assert!(!SendError::Rejected("552".into()).is_hard_bounce());
    }
}
