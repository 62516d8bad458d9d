//! Client errors.

use std::io;

use crate::types::Reply;

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// A recipient the server refused during `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefusedRecipient {
    /// The envelope address as given by the caller.
    pub recipient: String,
    /// The server's reply to `RCPT TO`.
    pub reply: Reply,
}

/// Everything that can go wrong talking to a server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket read, write or connect failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The TLS handshake failed: untrusted certificate, name mismatch, no
    /// common protocol version.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The server answered with a failure reply.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code.
        code: u16,
        /// Reply text, lines joined with `\n`.
        message: String,
    },

    /// `MAIL FROM` was not accepted.
    #[error("Sender {sender} refused: {code} {message}")]
    SenderRefused {
        /// Reply code.
        code: u16,
        /// Reply text.
        message: String,
        /// The sender we offered.
        sender: String,
    },

    /// No recipient was accepted, or the server gave up mid-envelope. Only
    /// the refused recipients are listed.
    #[error("{} recipient(s) refused", .0.len())]
    RecipientsRefused(Vec<RefusedRecipient>),

    /// The server broke the protocol, or we were asked to.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Not usable as an envelope address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// The server did not advertise what we need.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// EOF where a reply was expected.
    #[error("Connection unexpectedly closed")]
    ConnectionClosed,

    /// Gave up waiting.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),
}

impl Error {
    /// A failure reply from its code and text.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// A failure reply as received.
    #[must_use]
    pub fn from_reply(reply: &Reply) -> Self {
        Self::smtp_error(reply.code.as_u16(), reply.message_text())
    }
}
