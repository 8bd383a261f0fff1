//! OAuth webmail send channels (Google Workspace, Microsoft 365)
//!
//! Access tokens are minted from a long-lived refresh token and cached
//! until shortly before expiry. A refresh rejected with `invalid_grant`
//! means the mailbox owner revoked our access; that is surfaced as
//! [`SendError::CredentialsRevoked`] so the engine can pull the account
//! out of rotation.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sendfleet_common::ProviderKind;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{
    channel::{Channel, SendOutcome},
    error::SendError,
    message::OutboundMessage,
};

/// Refresh this long before the token actually expires.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Which webmail API a channel talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebmailApi {
    Google,
    Microsoft,
}

impl WebmailApi {
    #[must_use]
    pub const fn token_endpoint(self) -> &'static str {
        match self {
            Self::Google => "https://oauth2.googleapis.com/token",
            Self::Microsoft => "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        }
    }

    #[must_use]
    pub const fn send_endpoint(self) -> &'static str {
        match self {
            Self::Google => "https://gmail.googleapis.com/gmail/v1/users/me/messages/send",
            Self::Microsoft => "https://graph.microsoft.com/v1.0/me/sendMail",
        }
    }
}

/// OAuth client credentials plus the per-mailbox refresh token.
#[derive(Debug, Clone)]
pub struct WebmailCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_BUFFER_SECS) >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct GmailSendResponse {
    id: String,
}

/// A send channel bound to one webmail mailbox.
#[derive(Debug)]
pub struct WebmailChannel {
    api: WebmailApi,
    credentials: WebmailCredentials,
    http: reqwest::Client,
    /// Cached access token; the mutex also serializes refreshes.
    token: Mutex<Option<AccessToken>>,
    /// Endpoint overrides for tests.
    token_endpoint: Arc<str>,
    send_endpoint: Arc<str>,
}

impl WebmailChannel {
    #[must_use]
    pub fn new(api: WebmailApi, credentials: WebmailCredentials) -> Self {
        Self {
            api,
            credentials,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
            token_endpoint: Arc::from(api.token_endpoint()),
            send_endpoint: Arc::from(api.send_endpoint()),
        }
    }

    /// Point the channel at alternate endpoints. Test hook.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        token_endpoint: impl Into<Arc<str>>,
        send_endpoint: impl Into<Arc<str>>,
    ) -> Self {
        self.token_endpoint = token_endpoint.into();
        self.send_endpoint = send_endpoint.into();
        self
    }

    /// Return a valid access token, refreshing if the cached one is
    /// expired or missing.
    async fn access_token(&self) -> Result<String, SendError> {
        let mut guard = self.token.lock().await;

        if let Some(token) = guard.as_ref()
            && !token.is_expired(Utc::now())
        {
            return Ok(token.token.clone());
        }

        let response = self
            .http
            .post(self.token_endpoint.as_ref())
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("invalid_grant") {
                return Err(SendError::CredentialsRevoked(
                    "refresh token no longer valid".into(),
                ));
            }
            return Err(SendError::Transient(format!(
                "token refresh failed with status {status}: {body}"
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        let token = AccessToken {
            token: token_response.access_token,
            expires_at: Utc::now() + Duration::seconds(token_response.expires_in),
        };
        let access = token.token.clone();
        *guard = Some(token);

        Ok(access)
    }

    fn classify_send_status(status: reqwest::StatusCode, body: &str) -> SendError {
        let lowered = body.to_ascii_lowercase();
        match status.as_u16() {
            401 => SendError::CredentialsRevoked(format!("provider returned 401: {body}")),
            400 if lowered.contains("invalid")
                && (lowered.contains("recipient")
                    || lowered.contains("address")
                    || lowered.contains("to header")) =>
            {
                SendError::InvalidRecipient(body.to_string())
            }
            429 => SendError::Transient(format!("provider throttled the send: {body}")),
            500..=599 => SendError::Transient(format!("provider error {status}: {body}")),
            _ => SendError::Rejected(format!("provider returned {status}: {body}")),
        }
    }
}

#[async_trait]
impl Channel for WebmailChannel {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OauthWebmail
    }

    async fn send(&self, from: &str, message: &OutboundMessage) -> Result<SendOutcome, SendError> {
        let token = self.access_token().await?;
        let mime = message.to_mime(from);

        let request = match self.api {
            WebmailApi::Google => {
                let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
                    .encode(mime.content.as_bytes());
                self.http
                    .post(self.send_endpoint.as_ref())
                    .bearer_auth(&token)
                    .json(&serde_json::json!({ "raw": raw }))
            }
            WebmailApi::Microsoft => {
                // Graph accepts raw MIME when posted as base64 text
                let raw =
                    base64::engine::general_purpose::STANDARD.encode(mime.content.as_bytes());
                self.http
                    .post(self.send_endpoint.as_ref())
                    .bearer_auth(&token)
                    .header("Content-Type", "text/plain")
                    .body(raw)
            }
        };

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_send_status(status, &body));
        }

        let provider_message_id = match self.api {
            WebmailApi::Google => response
                .json::<GmailSendResponse>()
                .await
                .map(|r| r.id)
                .unwrap_or(mime.message_id),
            // Graph returns 202 with an empty body; the generated
            // Message-ID is the only stable handle we have
            WebmailApi::Microsoft => mime.message_id,
        };

        tracing::debug!(target: "sendfleet::provider", from, to = %message.to, %provider_message_id, "webmail send accepted");

        Ok(SendOutcome {
            provider_message_id,
        })
    }
}
