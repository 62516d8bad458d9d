//! Service extensions advertised in the EHLO reply.

use std::fmt;

/// One EHLO keyword line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// `STARTTLS`
    StartTls,
    /// `AUTH`, with mechanism names upper-cased as advertised.
    Auth(Vec<String>),
    /// Any other keyword, kept verbatim.
    Other(String),
}

impl Extension {
    /// Parses one line of an EHLO reply (without the code).
    ///
    /// The non-standard `AUTH=LOGIN PLAIN` form some older servers send is
    /// read the same as `AUTH LOGIN PLAIN`.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default();
        let (keyword, inline) = keyword
            .split_once('=')
            .map_or((keyword, None), |(k, first)| (k, Some(first)));

        match keyword.to_ascii_uppercase().as_str() {
            "STARTTLS" if inline.is_none() => Self::StartTls,
            "AUTH" => Self::Auth(
                inline
                    .into_iter()
                    .chain(words)
                    .map(str::to_ascii_uppercase)
                    .collect(),
            ),
            _ => Self::Other(line.to_string()),
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartTls => f.write_str("STARTTLS"),
            Self::Auth(names) if names.is_empty() => f.write_str("AUTH"),
            Self::Auth(names) => write!(f, "AUTH {}", names.join(" ")),
            Self::Other(line) => f.write_str(line),
        }
    }
}

/// SASL mechanisms this client can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// `PLAIN`, credentials in the initial response.
    Plain,
    /// `LOGIN`, username and password each answering a challenge.
    Login,
}

impl AuthMechanism {
    /// Most preferred first.
    pub const PREFERENCE: [Self; 2] = [Self::Plain, Self::Login];

    /// Recognizes a mechanism name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::PREFERENCE
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }

    /// The preferred mechanism among those usable, if any.
    #[must_use]
    pub fn negotiate(usable: &[Self]) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|m| usable.contains(m))
    }
}
