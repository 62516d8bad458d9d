//! Client commands and their wire form.

use std::fmt;

use crate::types::{Address, AuthMechanism};

/// One command line sent to the server.
///
/// `Display` renders the line without its terminator; [`Command::to_wire`]
/// adds the CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `EHLO <name>`
    Ehlo(&'a str),
    /// `HELO <name>`, for servers without ESMTP.
    Helo(&'a str),
    /// `STARTTLS`
    StartTls,
    /// `AUTH <mechanism> [initial response]`
    Auth(AuthMechanism, Option<String>),
    /// A base64 answer to a 334 challenge.
    AuthResponse(String),
    /// `MAIL FROM:<sender>`
    MailFrom(&'a Address),
    /// `RCPT TO:<recipient>`
    RcptTo(&'a Address),
    /// `DATA`
    Data,
    /// `RSET`
    Rset,
    /// `QUIT`
    Quit,
}

impl Command<'_> {
    /// The full line, CRLF-terminated.
    #[must_use]
    pub fn to_wire(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }

    /// Command name for trace output.
    ///
    /// Arguments are left out so credentials never reach the log.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
            Self::StartTls => "STARTTLS",
            Self::Auth(..) => "AUTH",
            Self::AuthResponse(_) => "AUTH (continuation)",
            Self::MailFrom(_) => "MAIL FROM",
            Self::RcptTo(_) => "RCPT TO",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        }
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ehlo(name) | Self::Helo(name) => write!(f, "{} {name}", self.verb()),
            Self::Auth(mechanism, None) => write!(f, "AUTH {}", mechanism.as_str()),
            Self::Auth(mechanism, Some(initial)) => {
                write!(f, "AUTH {} {initial}", mechanism.as_str())
            }
            Self::AuthResponse(line) => f.write_str(line),
            Self::MailFrom(address) => write!(f, "MAIL FROM:<{address}>"),
            Self::RcptTo(address) => write!(f, "RCPT TO:<{address}>"),
            Self::StartTls | Self::Data | Self::Rset | Self::Quit => f.write_str(self.verb()),
        }
    }
}
