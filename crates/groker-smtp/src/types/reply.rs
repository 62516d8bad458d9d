//! Server replies and their codes.

use std::fmt;

/// What the first digit of a reply code says about the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 2xx: done.
    Completed,
    /// 3xx: go on, the server wants more.
    Intermediate,
    /// 4xx: failed, may work later.
    Transient,
    /// 5xx: failed for good.
    Permanent,
    /// Anything outside 200..=599.
    Invalid,
}

/// Three-digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 greeting.
    pub const SERVICE_READY: Self = Self(220);
    /// 221 reply to QUIT.
    pub const CLOSING: Self = Self(221);
    /// 235 login accepted.
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 action completed.
    pub const OK: Self = Self(250);
    /// 251 recipient not local, will forward.
    pub const FORWARD: Self = Self(251);
    /// 334 AUTH challenge.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 send the message.
    pub const START_DATA: Self = Self(354);
    /// 421 the server is closing the channel.
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 535 credentials rejected.
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 mailbox unavailable.
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Class of this code.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::Completed,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::Transient,
            5 => ReplyClass::Permanent,
            _ => ReplyClass::Invalid,
        }
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self.class(), ReplyClass::Completed)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A complete, possibly multi-line, server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// The shared code of every line.
    pub code: ReplyCode,
    /// Text after the code on each line, decoded for display.
    pub message: Vec<String>,
}

impl Reply {
    /// Builds a reply from its parts.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// True for a 2xx reply.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// All lines joined with `\n`.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }
}

/// `<code> <line> <line>...` on one line.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        self.message
            .iter()
            .try_for_each(|line| write!(f, " {line}"))
    }
}
