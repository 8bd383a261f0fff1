//! Provider channels for outbound mail
//!
//! A [`Channel`] turns an [`OutboundMessage`] into one provider delivery
//! attempt and reports the result through the [`SendError`] taxonomy the
//! engine's retry policy is built on. Two channel families exist:
//!
//! - [`WebmailChannel`]: OAuth-authenticated webmail send APIs
//!   (Google Workspace, Microsoft 365)
//! - [`SmtpRelayChannel`]: SMTP submission against a mail relay

pub mod channel;
pub mod error;
pub mod message;
pub mod relay;
pub mod webmail;

pub use channel::{Channel, ChannelRegistry, SendOutcome, attempt_send, send_with_timeout};
pub use error::SendError;
pub use message::{MimeMessage, OutboundMessage};
pub use relay::{RelayConfig, RelayCredentials, SmtpRelayChannel};
pub use webmail::{WebmailApi, WebmailChannel, WebmailCredentials};
