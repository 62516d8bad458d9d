//! The diagnostic e-mail.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use groker_smtp::Address;

use crate::fault::{Fault, Result};
use crate::session::ConnectionConfig;

/// Name shown in the message body.
pub const TOOL_NAME: &str = "groker";

/// Where the tool comes from, shown in the message body.
pub const SOURCE_URL: &str = env!("CARGO_PKG_REPOSITORY");

/// Subject of the diagnostic message.
pub const SUBJECT: &str = "SMTP e-mail test";

/// A plain-text message with its envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSpec {
    sender: Address,
    recipients: Vec<Address>,
    subject: String,
    body: String,
}

impl MessageSpec {
    /// Validates the envelope and builds a message.
    ///
    /// # Errors
    ///
    /// Returns a generic fault naming each bad address, or noting that there
    /// are no recipients.
    pub fn new(
        sender: &str,
        recipients: &[String],
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self> {
        let mut details = BTreeMap::new();

        let sender = Address::new(sender)
            .map_err(|e| details.insert("sender".to_string(), e.to_string()))
            .ok();

        if recipients.is_empty() {
            details.insert("recipient".to_string(), "at least one recipient is required".into());
        }
        let mut valid = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            match Address::new(recipient.as_str()) {
                Ok(address) => valid.push(address),
                Err(e) => {
                    details.insert(format!("recipient {recipient}"), e.to_string());
                }
            }
        }

        match sender {
            Some(sender) if details.is_empty() => Ok(Self {
                sender,
                recipients: valid,
                subject: subject.into(),
                body: body.into(),
            }),
            _ => Err(Fault::Generic { details }),
        }
    }

    /// The diagnostic message: fixed subject, and a body echoing the
    /// connection parameters so the recipient can see what worked.
    ///
    /// # Errors
    ///
    /// Same as [`MessageSpec::new`].
    pub fn diagnostic(
        sender: &str,
        recipients: &[String],
        config: &ConnectionConfig,
    ) -> Result<Self> {
        let mut body = String::new();
        let _ = write!(
            body,
            "This is a test e-mail message.\r\n\
             powered by {TOOL_NAME} - {SOURCE_URL}\r\n\
             \r\n\
             -------------------------------------\r\n\
             Parameters:\r\n\
             -------------------------------------\r\n \
             - Host: {}:{}\r\n \
             - TLS: {}\r\n \
             - SSL: {}\r\n",
            config.host,
            config.transport.port,
            config.transport.use_tls(),
            config.transport.use_ssl(),
        );
        Self::new(sender, recipients, SUBJECT, body)
    }

    /// Envelope sender.
    #[must_use]
    pub const fn sender(&self) -> &Address {
        &self.sender
    }

    /// Envelope recipients, in order.
    #[must_use]
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    /// Message body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Renders the RFC 5322 message with the given `Date`.
    #[must_use]
    pub fn render(&self, date: DateTime<Utc>) -> String {
        let to = self
            .recipients
            .iter()
            .map(Address::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        let mut message = String::new();
        let _ = write!(message, "From: {}\r\n", self.sender);
        let _ = write!(message, "To: {to}\r\n");
        let _ = write!(message, "Subject: {}\r\n", self.subject);
        let _ = write!(message, "Date: {}\r\n", date.to_rfc2822());
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        message.push_str("\r\n");
        message.push_str(&self.body);
        message
    }
}
