//! Outbound message model and MIME rendering

use std::sync::Arc;

use chrono::Utc;

/// One message ready for a provider send.
///
/// The engine treats the body as opaque: personalization and variant
/// rendering happen upstream in the campaign flow.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Recipient address.
    pub to: Arc<str>,
    /// Optional recipient display name.
    pub to_name: Option<Arc<str>>,
    pub subject: Arc<str>,
    /// Plain-text body.
    pub text_body: Arc<str>,
    /// HTML body; when present the message renders as
    /// `multipart/alternative`.
    pub html_body: Option<Arc<str>>,
    pub reply_to: Option<Arc<str>>,
    /// Extra headers, e.g. `List-Unsubscribe`.
    pub headers: Vec<(String, String)>,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(
        to: impl Into<Arc<str>>,
        subject: impl Into<Arc<str>>,
        text_body: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            to: to.into(),
            to_name: None,
            subject: subject.into(),
            text_body: text_body.into(),
            html_body: None,
            reply_to: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_html(mut self, html_body: impl Into<Arc<str>>) -> Self {
        self.html_body = Some(html_body.into());
        self
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<Arc<str>>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Render the message as an RFC 5322 document sent from `from`.
    ///
    /// A fresh `Message-ID` is generated on every call, so one render
    /// corresponds to one delivery attempt.
    #[must_use]
    pub fn to_mime(&self, from: &str) -> MimeMessage {
        let domain = from.rsplit('@').next().unwrap_or("localhost");
        let message_id = format!("<{}@{domain}>", ulid::Ulid::new());

        let mut out = String::new();
        out.push_str(&format!("From: {from}\r\n"));
        match &self.to_name {
            Some(name) => out.push_str(&format!("To: \"{name}\" <{}>\r\n", self.to)),
            None => out.push_str(&format!("To: {}\r\n", self.to)),
        }
        out.push_str(&format!("Subject: {}\r\n", self.subject));
        out.push_str(&format!("Date: {}\r\n", Utc::now().to_rfc2822()));
        out.push_str(&format!("Message-ID: {message_id}\r\n"));
        if let Some(reply_to) = &self.reply_to {
            out.push_str(&format!("Reply-To: {reply_to}\r\n"));
        }
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("MIME-Version: 1.0\r\n");

        if let Some(html) = &self.html_body {
            // Boundary only needs to be unique within this message
            let boundary = format!("=_sf_{}", ulid::Ulid::new());
            out.push_str(&format!(
                "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\r\n"
            ));
            out.push_str(&format!("--{boundary}\r\n"));
            out.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
            out.push_str(&self.text_body);
            out.push_str(&format!("\r\n--{boundary}\r\n"));
            out.push_str("Content-Type: text/html; charset=utf-8\r\n\r\n");
            out.push_str(html);
            out.push_str(&format!("\r\n--{boundary}--\r\n"));
        } else {
            out.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
            out.push_str(&self.text_body);
            out.push_str("\r\n");
        }

        MimeMessage {
            message_id,
            content: out,
        }
    }
}

/// A rendered RFC 5322 message plus its generated `Message-ID`.
#[derive(Debug, Clone)]
pub struct MimeMessage {
    pub message_id: String,
    pub content: String,
}
