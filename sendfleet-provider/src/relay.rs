//! SMTP relay submission channel
//!
//! Speaks just enough RFC 5321 for authenticated submission: greeting,
//! EHLO, AUTH PLAIN, one MAIL/RCPT/DATA transaction, QUIT. Reply codes
//! map onto the [`SendError`] taxonomy; the RCPT stage is where hard
//! bounces are distinguished from policy rejections.

use async_trait::async_trait;
use base64::Engine;
use sendfleet_common::ProviderKind;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::{
    channel::{Channel, SendOutcome},
    error::SendError,
    message::OutboundMessage,
};

/// Username and password for AUTH PLAIN.
#[derive(Debug, Clone)]
pub struct RelayCredentials {
    pub username: String,
    pub password: String,
}

/// Connection settings for one relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Name announced in EHLO.
    pub hello_name: String,
    pub credentials: Option<RelayCredentials>,
}

impl RelayConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            hello_name: "localhost".into(),
            credentials: None,
        }
    }

    /// Google Workspace submission preset.
    #[must_use]
    pub fn google(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new("smtp.gmail.com", 587).with_credentials(username, password)
    }

    /// Microsoft 365 submission preset.
    #[must_use]
    pub fn microsoft(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new("smtp.office365.com", 587).with_credentials(username, password)
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(RelayCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    #[must_use]
    pub fn with_hello_name(mut self, hello_name: impl Into<String>) -> Self {
        self.hello_name = hello_name.into();
        self
    }
}

/// A complete (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    const fn is_temporary(&self) -> bool {
        self.code >= 400 && self.code < 500
    }
}

/// A send channel submitting through one SMTP relay.
#[derive(Debug)]
pub struct SmtpRelayChannel {
    config: RelayConfig,
}

impl SmtpRelayChannel {
    #[must_use]
    pub const fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    async fn read_reply<R>(reader: &mut R) -> Result<Reply, SendError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut text = String::new();

        loop {
            let mut line = String::new();
            let bytes = reader.read_line(&mut line).await?;
            if bytes == 0 {
                return Err(SendError::Transient("connection closed by relay".into()));
            }

            let line = line.trim_end();
            // `get` refuses short lines and code bytes split by a
            // multibyte character alike
            let code = line
                .get(..3)
                .and_then(|prefix| prefix.parse::<u16>().ok())
                .ok_or_else(|| SendError::Transient(format!("malformed reply: {line:?}")))?;

            if !text.is_empty() {
                text.push('\n');
            }
            if let Some(rest) = line.get(4..) {
                text.push_str(rest);
            }

            // A space after the code ends a multi-line reply
            if line.len() == 3 || line.as_bytes()[3] == b' ' {
                return Ok(Reply { code, text });
            }
        }
    }

    async fn command(
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut OwnedWriteHalf,
        command: &str,
    ) -> Result<Reply, SendError> {
        writer.write_all(command.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;
        Self::read_reply(reader).await
    }

    /// Map a failed reply outside the RCPT stage onto the taxonomy.
    fn classify(stage: &str, reply: &Reply) -> SendError {
        if reply.is_temporary() {
            SendError::Transient(format!("{stage}: {} {}", reply.code, reply.text))
        } else {
            SendError::Rejected(format!("{stage}: {} {}", reply.code, reply.text))
        }
    }

    /// RCPT failures carry the bounce semantics.
    fn classify_rcpt(reply: &Reply) -> SendError {
        match reply.code {
            // Mailbox unavailable / gone / not allowed here
            550 | 551 | 553 => {
                SendError::HardBounce(format!("{} {}", reply.code, reply.text))
            }
            400..=499 => SendError::Transient(format!("rcpt: {} {}", reply.code, reply.text)),
            _ => SendError::InvalidRecipient(format!("{} {}", reply.code, reply.text)),
        }
    }

    /// Escape lines starting with a dot, per RFC 5321 section 4.5.2.
    fn dot_stuff(content: &str) -> String {
        let mut out = String::with_capacity(content.len());
        for line in content.split_inclusive('\n') {
            if line.starts_with('.') {
                out.push('.');
            }
            out.push_str(line);
        }
        out
    }
}

#[async_trait]
impl Channel for SmtpRelayChannel {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ProtocolRelay
    }

    async fn send(&self, from: &str, message: &OutboundMessage) -> Result<SendOutcome, SendError> {
        let stream =
            TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let greeting = Self::read_reply(&mut reader).await?;
        if !greeting.is_success() {
            return Err(Self::classify("greeting", &greeting));
        }

        let ehlo = Self::command(
            &mut reader,
            &mut writer,
            &format!("EHLO {}", self.config.hello_name),
        )
        .await?;
        if !ehlo.is_success() {
            return Err(Self::classify("ehlo", &ehlo));
        }

        if let Some(credentials) = &self.config.credentials {
            let token = base64::engine::general_purpose::STANDARD.encode(format!(
                "\0{}\0{}",
                credentials.username, credentials.password
            ));
            let auth =
                Self::command(&mut reader, &mut writer, &format!("AUTH PLAIN {token}")).await?;
            if auth.code != 235 {
                return Err(if auth.is_temporary() {
                    SendError::Transient(format!("auth: {} {}", auth.code, auth.text))
                } else {
                    SendError::CredentialsRevoked(format!("{} {}", auth.code, auth.text))
                });
            }
        }

        let mail = Self::command(&mut reader, &mut writer, &format!("MAIL FROM:<{from}>")).await?;
        if !mail.is_success() {
            return Err(Self::classify("mail from", &mail));
        }

        let rcpt = Self::command(
            &mut reader,
            &mut writer,
            &format!("RCPT TO:<{}>", message.to),
        )
        .await?;
        if !rcpt.is_success() {
            return Err(Self::classify_rcpt(&rcpt));
        }

        let data = Self::command(&mut reader, &mut writer, "DATA").await?;
        if data.code != 354 {
            return Err(Self::classify("data", &data));
        }

        let mime = message.to_mime(from);
        writer
            .write_all(Self::dot_stuff(&mime.content).as_bytes())
            .await?;
        if !mime.content.ends_with('\n') {
            writer.write_all(b"\r\n").await?;
        }
        writer.write_all(b".\r\n").await?;
        writer.flush().await?;

        let accepted = Self::read_reply(&mut reader).await?;
        if !accepted.is_success() {
            return Err(Self::classify("data end", &accepted));
        }

        // Best effort; the message is already accepted
        let _ = Self::command(&mut reader, &mut writer, "QUIT").await;

        tracing::debug!(
            target: "sendfleet::provider",
            from,
            to = %message.to,
            relay = %self.config.host,
            reply = %accepted.text,
            "relay accepted message"
        );

        Ok(SendOutcome {
            provider_message_id: mime.message_id,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn multiline_replies_are_joined() {
        let mut reader = BufReader::new(&b"250-first\r\n250 second\r\n"[..]);
        let reply = SmtpRelayChannel::read_reply(&mut reader).await.unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.text, "first\nsecond");
    }

    #[tokio::test]
    async fn garbled_reply_is_a_transient_error() {
        // Code bytes interrupted by a multibyte character
        let mut reader = BufReader::new("25\u{e9} 250 ok\r\n".as_bytes());
        assert!(matches!(
            SmtpRelayChannel::read_reply(&mut reader).await,
            Err(SendError::Transient(_))
        ));

        let mut reader = BufReader::new(&b"x\r\n"[..]);
        assert!(matches!(
            SmtpRelayChannel::read_reply(&mut reader).await,
            Err(SendError::Transient(_))
        ));

        let mut reader = BufReader::new(&b"abc ok\r\n"[..]);
        assert!(matches!(
            SmtpRelayChannel::read_reply(&mut reader).await,
            Err(SendError::Transient(_))
        ));
    }

    #[test]
    fn dot_stuffing() {
        assert_eq!(
            SmtpRelayChannel::dot_stuff(".hidden\r\nvisible\r\n..already\r\n"),
            "..hidden\r\nvisible\r\n...already\r\n"
        );
        assert_eq!(SmtpRelayChannel::dot_stuff("no dots\r\n"), "no dots\r\n");
    }

    #[test]
    fn rcpt_classification() {
        let reply = |code, text: &str| Reply {
            code,
            text: text.into(),
        };

        assert!(matches!(
            SmtpRelayChannel::classify_rcpt(&reply(550, "no such user")),
            SendError::HardBounce(_)
        ));
        assert!(matches!(
            SmtpRelayChannel::classify_rcpt(&reply(551, "user not local")),
            SendError::HardBounce(_)
        ));
        assert!(matches!(
            SmtpRelayChannel::classify_rcpt(&reply(450, "greylisted")),
            SendError::Transient(_)
        ));
        assert!(matches!(
            SmtpRelayChannel::classify_rcpt(&reply(554, "policy rejection")),
            SendError::InvalidRecipient(_)
        ));
    }

    #[test]
    fn presets() {
        let google = RelayConfig::google("jane@acmeleads.com", "app-password");
        assert_eq!(google.host, "smtp.gmail.com");
        assert_eq!(google.port, 587);
        assert!(google.credentials.is_some());

        let microsoft = RelayConfig::microsoft("jane@acmeleads.com", "app-password");
        assert_eq!(microsoft.host, "smtp.office365.com");
        assert_eq!(microsoft.port, 587);
    }
}
