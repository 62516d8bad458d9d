//! Envelope addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A mailbox as it appears between `<` and `>` in `MAIL FROM` / `RCPT TO`.
///
/// Only the shape is checked: exactly one `@` with something on both sides,
/// and nothing that could end the command line early.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Checks and wraps an address.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAddress`] naming what is wrong.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        match problem(&addr) {
            None => Ok(Self(addr)),
            Some(why) if addr.is_empty() => Err(Error::InvalidAddress(why.into())),
            Some(why) => Err(Error::InvalidAddress(format!("{addr}: {why}"))),
        }
    }

    /// The address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn problem(addr: &str) -> Option<&'static str> {
    if addr.is_empty() {
        return Some("address cannot be empty");
    }
    if addr
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>'))
    {
        return Some("contains whitespace or angle brackets");
    }
    match addr.split('@').collect::<Vec<_>>()[..] {
        [local, domain] if !local.is_empty() && !domain.is_empty() => None,
        [_, _] => Some("local and domain parts cannot be empty"),
        [_] => Some("missing @"),
        _ => Some("must have exactly one @"),
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
